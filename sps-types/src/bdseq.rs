use std::fmt;

use crate::{
    constants::BDSEQ,
    payload::{DataType, Metric, PayloadError, Value},
};

/// Birth/death sequence number distinguishing successive sessions of an edge node.
///
/// Carried on the wire as an Int64 metric but only ever takes values 0-255 and wraps.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct BdSeq(u8);

impl BdSeq {
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u8 {
        self.0
    }

    /// The bdSeq of the session following this one
    pub fn next(&self) -> Self {
        Self(self.0.wrapping_add(1))
    }

    /// Serial number comparison modulo 256.
    ///
    /// `self` is newer than `other` when it is between 1 and 127 steps ahead of it.
    pub fn is_newer_than(&self, other: BdSeq) -> bool {
        let distance = self.0.wrapping_sub(other.0);
        distance != 0 && distance < 128
    }

    /// The bdSeq metric included in birth and death certificates
    pub fn to_metric(&self) -> Metric {
        let mut metric = Metric::new();
        metric
            .set_name(BDSEQ.to_string())
            .set_datatype(DataType::Int64)
            .set_value(Value::LongValue(self.0 as u64));
        metric
    }
}

impl fmt::Display for BdSeq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl TryFrom<&Value> for BdSeq {
    type Error = PayloadError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let raw = match value {
            Value::IntValue(v) => *v as u64,
            Value::LongValue(v) => *v,
            other => {
                return Err(PayloadError::InvalidBdSeq(format!(
                    "unexpected value type {other:?}"
                )))
            }
        };
        u8::try_from(raw)
            .map(BdSeq)
            .map_err(|_| PayloadError::InvalidBdSeq(format!("{raw} is outside of 0-255")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newer_wraps() {
        assert!(BdSeq::new(1).is_newer_than(BdSeq::new(0)));
        assert!(BdSeq::new(0).is_newer_than(BdSeq::new(255)));
        assert!(!BdSeq::new(3).is_newer_than(BdSeq::new(3)));
        assert!(!BdSeq::new(2).is_newer_than(BdSeq::new(3)));
        assert!(!BdSeq::new(200).is_newer_than(BdSeq::new(10)));
        assert_eq!(BdSeq::new(255).next(), BdSeq::new(0));
    }

    #[test]
    fn from_value() {
        assert_eq!(BdSeq::try_from(&Value::LongValue(7)), Ok(BdSeq::new(7)));
        assert_eq!(BdSeq::try_from(&Value::IntValue(255)), Ok(BdSeq::new(255)));
        assert!(BdSeq::try_from(&Value::LongValue(256)).is_err());
        assert!(BdSeq::try_from(&Value::BooleanValue(true)).is_err());
    }
}
