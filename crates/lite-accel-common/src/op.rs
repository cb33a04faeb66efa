//! Operator kinds known to the kernel runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The primitive type of the operator a kernel implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatorKind {
    Conv2D,
    DepthwiseConv2D,
    DeConv2D,
    MatMul,
    FullConnection,
    Pooling,
    Activation,
    Arithmetic,
    Softmax,
    Resize,
    Transpose,
    Reshape,
    Concat,
    Other,
}

impl OperatorKind {
    /// Compute-heavy operators tuned under [`TuningMode::Fast`](crate::TuningMode::Fast).
    pub const FAST_TUNING: [OperatorKind; 3] =
        [Self::Conv2D, Self::DepthwiseConv2D, Self::DeConv2D];

    /// Whether this operator is on the fast-mode allow-list.
    pub fn is_fast_tuning_candidate(self) -> bool {
        Self::FAST_TUNING.contains(&self)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Conv2D => "Conv2D",
            Self::DepthwiseConv2D => "DepthwiseConv2D",
            Self::DeConv2D => "DeConv2D",
            Self::MatMul => "MatMul",
            Self::FullConnection => "FullConnection",
            Self::Pooling => "Pooling",
            Self::Activation => "Activation",
            Self::Arithmetic => "Arithmetic",
            Self::Softmax => "Softmax",
            Self::Resize => "Resize",
            Self::Transpose => "Transpose",
            Self::Reshape => "Reshape",
            Self::Concat => "Concat",
            Self::Other => "Other",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fast_list_is_convolutions_only() {
        assert!(OperatorKind::Conv2D.is_fast_tuning_candidate());
        assert!(OperatorKind::DepthwiseConv2D.is_fast_tuning_candidate());
        assert!(OperatorKind::DeConv2D.is_fast_tuning_candidate());
        assert!(!OperatorKind::MatMul.is_fast_tuning_candidate());
        assert!(!OperatorKind::Transpose.is_fast_tuning_candidate());
    }

    #[test]
    fn display_names() {
        assert_eq!(OperatorKind::DepthwiseConv2D.to_string(), "DepthwiseConv2D");
        assert_eq!(OperatorKind::Other.to_string(), "Other");
    }
}
