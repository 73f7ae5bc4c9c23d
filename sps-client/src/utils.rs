use sps_types::{
    constants::{SPBV01, STATE},
    payload::Payload,
    topic::{MessageKind, NodeIdentifier, ScopeId},
    StatePayload,
};

use crate::{Event, Message, MessageError};

fn next_segment<'a>(
    iter: &mut impl Iterator<Item = &'a [u8]>,
) -> Result<String, MessageError> {
    match iter.next() {
        Some(val) if !val.is_empty() => Ok(String::from_utf8(val.to_vec())?),
        _ => Err(MessageError::InvalidSparkplugTopic),
    }
}

/// Classify a received publish into an [Event].
///
/// Accepts `spBv1.0/STATE/<host_id>` and `spBv1.0/<group>/<KIND>/<node>[/<device>]`.
pub fn topic_and_payload_to_event(topic: &[u8], payload: &[u8]) -> Result<Event, MessageError> {
    let mut iter = topic.split(|c| *c == b'/');

    match iter.next() {
        Some(namespace) if namespace == SPBV01.as_bytes() => (),
        _ => return Err(MessageError::InvalidSparkplugTopic),
    }

    let state_or_group_id = match iter.next() {
        Some(val) => val,
        None => return Err(MessageError::InvalidSparkplugTopic),
    };

    if STATE.as_bytes().eq(state_or_group_id) {
        let host_id = next_segment(&mut iter)?;
        if iter.next().is_some() {
            return Err(MessageError::InvalidSparkplugTopic);
        }
        let payload =
            StatePayload::from_slice(payload).map_err(MessageError::InvalidStatePayload)?;
        return Ok(Event::State { host_id, payload });
    }

    let group_id = String::from_utf8(state_or_group_id.to_vec())?;
    if group_id.is_empty() {
        return Err(MessageError::InvalidSparkplugTopic);
    }

    let kind = match iter.next().and_then(MessageKind::from_token) {
        Some(kind) => kind,
        None => return Err(MessageError::InvalidSparkplugTopic),
    };

    let node = NodeIdentifier::new(group_id, next_segment(&mut iter)?);

    let id = if kind.is_device() {
        ScopeId::Device(node.device(next_segment(&mut iter)?))
    } else {
        ScopeId::Node(node)
    };

    if iter.next().is_some() {
        return Err(MessageError::InvalidSparkplugTopic);
    }

    let payload = Payload::from_slice(payload).map_err(MessageError::InvalidPayload)?;
    Ok(Event::Message(Message { id, kind, payload }))
}
