use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{bdseq::BdSeq, constants::BDSEQ};

/// Errors raised when reading session fields from a [Payload]
#[derive(Error, Debug, PartialEq)]
pub enum PayloadError {
    #[error("payload has no seq")]
    MissingSeq,
    #[error("seq {0} is outside of 0-255")]
    SeqOutOfRange(u64),
    #[error("payload has no timestamp")]
    MissingTimestamp,
    #[error("payload has no bdSeq metric")]
    MissingBdSeq,
    #[error("invalid bdSeq metric: {0}")]
    InvalidBdSeq(String),
    #[error("payload could not be encoded or decoded: {0}")]
    Codec(String),
}

/// Sparkplug data types. Only used as an opaque declared type by the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DataType {
    Unknown = 0,
    Int8 = 1,
    Int16 = 2,
    Int32 = 3,
    Int64 = 4,
    UInt8 = 5,
    UInt16 = 6,
    UInt32 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Boolean = 11,
    String = 12,
    DateTime = 13,
    Text = 14,
    Uuid = 15,
    DataSet = 16,
    Bytes = 17,
    File = 18,
    Template = 19,
}

impl TryFrom<u32> for DataType {
    type Error = ();

    fn try_from(v: u32) -> Result<Self, Self::Error> {
        let datatype = match v {
            0 => DataType::Unknown,
            1 => DataType::Int8,
            2 => DataType::Int16,
            3 => DataType::Int32,
            4 => DataType::Int64,
            5 => DataType::UInt8,
            6 => DataType::UInt16,
            7 => DataType::UInt32,
            8 => DataType::UInt64,
            9 => DataType::Float,
            10 => DataType::Double,
            11 => DataType::Boolean,
            12 => DataType::String,
            13 => DataType::DateTime,
            14 => DataType::Text,
            15 => DataType::Uuid,
            16 => DataType::DataSet,
            17 => DataType::Bytes,
            18 => DataType::File,
            19 => DataType::Template,
            _ => return Err(()),
        };
        Ok(datatype)
    }
}

/// A metric value as carried by the envelope.
///
/// The session layer only inspects boolean (rebirth), integer (bdSeq) and template (nested metrics) values.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Value {
    IntValue(u32),
    LongValue(u64),
    FloatValue(f32),
    DoubleValue(f64),
    BooleanValue(bool),
    StringValue(String),
    BytesValue(Vec<u8>),
    TemplateValue(Template),
}

/// A template instance or definition containing nested metrics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub template_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_definition: Option<bool>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Metric {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datatype: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_null: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
}

impl Metric {
    pub fn new() -> Self {
        Self {
            is_null: Some(true),
            ..Default::default()
        }
    }

    pub fn set_name(&mut self, name: String) -> &mut Self {
        self.name = Some(name);
        self
    }

    pub fn set_alias(&mut self, alias: u64) -> &mut Self {
        self.alias = Some(alias);
        self
    }

    pub fn set_datatype(&mut self, datatype: DataType) -> &mut Self {
        self.datatype = Some(datatype as u32);
        self
    }

    pub fn set_timestamp(&mut self, timestamp: u64) -> &mut Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn set_value(&mut self, value: Value) -> &mut Self {
        self.value = Some(value);
        self.is_null = None;
        self
    }

    pub fn set_null(&mut self) -> &mut Self {
        self.value = None;
        self.is_null = Some(true);
        self
    }

    /// The declared data type, if present and known
    pub fn data_type(&self) -> Option<DataType> {
        self.datatype.and_then(|d| DataType::try_from(d).ok())
    }

    /// Nested metrics of a template instance. Template definitions are not instances and return `None`.
    pub fn template_members(&self) -> Option<&[Metric]> {
        match &self.value {
            Some(Value::TemplateValue(t)) if !t.is_definition.unwrap_or(false) => {
                Some(&t.metrics)
            }
            _ => None,
        }
    }

    pub fn template_members_mut(&mut self) -> Option<&mut Vec<Metric>> {
        match &mut self.value {
            Some(Value::TemplateValue(t)) if !t.is_definition.unwrap_or(false) => {
                Some(&mut t.metrics)
            }
            _ => None,
        }
    }
}

/// The opaque message envelope: a sequence number, a timestamp and a list of metrics
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub metrics: Vec<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seq: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uuid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Vec<u8>>,
}

impl Payload {
    /// The sequence number of the message, range checked to 0-255
    pub fn seq_number(&self) -> Result<u8, PayloadError> {
        let seq = self.seq.ok_or(PayloadError::MissingSeq)?;
        u8::try_from(seq).map_err(|_| PayloadError::SeqOutOfRange(seq))
    }

    pub fn timestamp(&self) -> Result<u64, PayloadError> {
        self.timestamp.ok_or(PayloadError::MissingTimestamp)
    }

    /// The value of the distinguished bdSeq metric of a birth or death certificate
    pub fn bdseq(&self) -> Result<BdSeq, PayloadError> {
        let metric = self
            .metrics
            .iter()
            .find(|m| m.name.as_deref() == Some(BDSEQ))
            .ok_or(PayloadError::MissingBdSeq)?;
        match &metric.value {
            Some(value) => BdSeq::try_from(value),
            None => Err(PayloadError::InvalidBdSeq("no value".into())),
        }
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, PayloadError> {
        serde_json::to_vec(self).map_err(|e| PayloadError::Codec(e.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self, PayloadError> {
        serde_json::from_slice(bytes).map_err(|e| PayloadError::Codec(e.to_string()))
    }
}
