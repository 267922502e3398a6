use serde_json::Value;

use crate::types::Variant;

#[derive(Debug)]
pub enum ParsedClientMessage {
    Start {
        variant: Option<Variant>,
        seed: Option<i64>,
    },
    SelectNode {
        node_id: String,
    },
    Action {
        node_id: String,
        value: i64,
        distance: Option<f64>,
    },
    Ping {
        t: f64,
    },
}

/// Body of `POST /process_action`.
#[derive(Debug, PartialEq)]
pub struct ParsedProcessAction {
    pub node_id: String,
    pub value: i64,
    pub distance: Option<f64>,
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "start" => {
            let variant = match object.get("variant") {
                None => None,
                Some(value) => Variant::parse(value.as_str()?),
            };
            if object.get("variant").is_some() && variant.is_none() {
                return None;
            }
            let seed = parse_optional_i64(object.get("seed"))?;
            Some(ParsedClientMessage::Start { variant, seed })
        }
        "select_node" => {
            let node_id = object.get("nodeId")?.as_str()?.to_string();
            Some(ParsedClientMessage::SelectNode { node_id })
        }
        "action" => {
            let node_id = object.get("nodeId")?.as_str()?.to_string();
            let value = parse_optional_i64(object.get("value"))??;
            let distance = parse_optional_f64(object.get("distance"))?;
            Some(ParsedClientMessage::Action {
                node_id,
                value,
                distance,
            })
        }
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

pub fn parse_process_action(value: &Value) -> Option<ParsedProcessAction> {
    let object = value.as_object()?;
    let node_id = match object.get("node_id") {
        None | Some(Value::Null) => String::new(),
        Some(value) => value.as_str()?.to_string(),
    };
    let value = parse_optional_i64(object.get("value"))??;
    let distance = parse_optional_f64(object.get("distance"))?;
    Some(ParsedProcessAction {
        node_id,
        value,
        distance,
    })
}

/// `null` counts as absent; anything else must be a finite number.
fn parse_optional_f64(value: Option<&Value>) -> Option<Option<f64>> {
    match value {
        None | Some(Value::Null) => Some(None),
        Some(value) => {
            let number = value.as_f64()?;
            number.is_finite().then_some(Some(number))
        }
    }
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
