//! Topic codec: building derived topics and classifying inbound ones
//!
//! Registration: `/sys/<ownId>/<min|max>/<system>/<control>`, payload hours or empty
//! Data:         `/devices/<system>/controls/<control>[/meta/unit]`
//! Derived:      `/devices/<system>/controls/<control> <kind>[/meta/unit]`

use crate::bus::InboundMessage;
use crate::saver::error::SaverError;
use crate::saver::types::{SaverKey, SaverKind, Source};

pub const DEVICES_ROOT: &str = "devices";
pub const SYS_ROOT: &str = "sys";
pub const CONTROLS: &str = "controls";
pub const UNIT_SUFFIX: &str = "meta/unit";

/// `/devices/<system>/<segment>/...`; segments may themselves contain `/`
pub fn build_topic(system: &str, segments: &[&str]) -> String {
    let mut topic = format!("/{}/{}", DEVICES_ROOT, system);
    for segment in segments.iter().filter(|s| !s.is_empty()) {
        topic.push('/');
        topic.push_str(segment);
    }
    topic
}

pub fn value_topic(source: &Source) -> String {
    build_topic(&source.system, &[CONTROLS, &source.control])
}

pub fn unit_topic(source: &Source) -> String {
    build_topic(&source.system, &[CONTROLS, &source.control, UNIT_SUFFIX])
}

/// Retained topic carrying the extreme, e.g. `.../controls/Power min`
pub fn extreme_topic(kind: SaverKind, source: &Source) -> String {
    let control = format!("{} {}", source.control, kind);
    build_topic(&source.system, &[CONTROLS, &control])
}

pub fn extreme_unit_topic(kind: SaverKind, source: &Source) -> String {
    let control = format!("{} {}", source.control, kind);
    build_topic(&source.system, &[CONTROLS, &control, UNIT_SUFFIX])
}

/// Wildcard covering every registration addressed to `own_id`
pub fn registration_filter(own_id: &str) -> String {
    format!("/{}/{}/+/+/+", SYS_ROOT, own_id)
}

/// Registration topic for a saver, as a configuring client would publish it
pub fn registration_topic(own_id: &str, key: &SaverKey) -> String {
    format!(
        "/{}/{}/{}/{}/{}",
        SYS_ROOT,
        own_id,
        key.kind,
        key.system(),
        key.control()
    )
}

/// Split a topic into levels, dropping the empty level before a leading `/`
pub fn split_topic(topic: &str) -> Vec<&str> {
    let topic = topic.strip_prefix('/').unwrap_or(topic);
    topic.split('/').collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataField {
    Value,
    Unit,
}

/// Shape of an inbound topic
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicRoute {
    Registration(SaverKey),
    Data { source: Source, field: DataField },
}

pub fn parse_topic(topic: &str, own_id: &str) -> Result<TopicRoute, SaverError> {
    let segments = split_topic(topic);

    match segments.as_slice() {
        [SYS_ROOT, system_id, rest @ ..] => {
            if *system_id != own_id {
                return Err(SaverError::ForeignSystem(topic.to_string()));
            }
            match rest {
                [kind, system, control] if !system.is_empty() && !control.is_empty() => {
                    let kind = SaverKind::from_segment(kind)
                        .ok_or_else(|| SaverError::UnknownKind(kind.to_string()))?;
                    Ok(TopicRoute::Registration(SaverKey::new(kind, *system, *control)))
                }
                _ => Err(SaverError::MalformedTopic(topic.to_string())),
            }
        }
        [DEVICES_ROOT, system, CONTROLS, control] if !system.is_empty() && !control.is_empty() => {
            Ok(TopicRoute::Data {
                source: Source::new(*system, *control),
                field: DataField::Value,
            })
        }
        [DEVICES_ROOT, system, CONTROLS, control, "meta", "unit"]
            if !system.is_empty() && !control.is_empty() =>
        {
            Ok(TopicRoute::Data {
                source: Source::new(*system, *control),
                field: DataField::Unit,
            })
        }
        _ => Err(SaverError::MalformedTopic(topic.to_string())),
    }
}

/// Inbound message after classification, matched exhaustively by the dispatcher
#[derive(Debug, Clone, PartialEq)]
pub enum SaverCommand {
    Register { key: SaverKey, hours: String },
    Remove { key: SaverKey },
    Value { source: Source, payload: String },
    Unit { source: Source, unit: String },
}

pub fn classify(message: &InboundMessage, own_id: &str) -> Result<SaverCommand, SaverError> {
    let command = match parse_topic(&message.topic, own_id)? {
        TopicRoute::Registration(key) if message.payload.is_empty() => SaverCommand::Remove { key },
        TopicRoute::Registration(key) => SaverCommand::Register {
            key,
            hours: message.payload.clone(),
        },
        TopicRoute::Data {
            source,
            field: DataField::Value,
        } => SaverCommand::Value {
            source,
            payload: message.payload.clone(),
        },
        TopicRoute::Data {
            source,
            field: DataField::Unit,
        } => SaverCommand::Unit {
            source,
            unit: message.payload.clone(),
        },
    };
    Ok(command)
}
