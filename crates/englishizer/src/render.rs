// SPDX-FileCopyrightText: © 2025 Gibberlink Contributors
//
// SPDX-License-Identifier: MPL-2.0

//! Template renderers, one per message kind.
//!
//! Renderers are pure functions from a (redacted) payload to deterministic
//! text plus extracted fields. Confidence is 1.0 for a fully-templated
//! rendering, lower when the renderer had to guess, and at most 0.3 for the
//! structural fallback.

use indexmap::IndexMap;

use gibberlink_core::Value;

/// Renderer output before option processing.
#[derive(Debug, Clone)]
pub struct Rendered {
    pub text: String,
    pub bullets: Option<Vec<String>>,
    pub fields: IndexMap<String, String>,
    pub confidence: f32,
    pub source_mapping: IndexMap<String, String>,
}

impl Rendered {
    fn new(text: String, confidence: f32) -> Self {
        Self {
            text,
            bullets: None,
            fields: IndexMap::new(),
            confidence,
            source_mapping: IndexMap::new(),
        }
    }

    fn field(mut self, name: &str, value: String, path: &str) -> Self {
        self.fields.insert(name.to_string(), value);
        self.source_mapping.insert(name.to_string(), path.to_string());
        self
    }
}

/// Pure renderer over a redacted payload.
pub type Renderer = Box<dyn Fn(&Value) -> Rendered + Send + Sync>;

/// Short scalar rendering for template slots.
fn brief(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Float(f) => {
            if f.fract() == 0.0 {
                format!("{f:.0}")
            } else {
                format!("{f}")
            }
        }
        Value::String(s) => s.clone(),
        Value::Bytes(b) => format!("{} bytes", b.len()),
        Value::Array(items) => format!("[{} items]", items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().take(4).map(String::as_str).collect();
            format!("{{{}}}", keys.join(", "))
        }
    }
}

/// `a: 2, b: 3` rendering of an object's entries.
fn brief_entries(value: &Value) -> String {
    value.as_object().map_or_else(
        || brief(value),
        |map| {
            map.iter()
                .map(|(k, v)| format!("{k}: {}", brief(v)))
                .collect::<Vec<_>>()
                .join(", ")
        },
    )
}

/// Human MTU: bytes below 1 KiB, then KB/MB.
fn format_mtu(bytes: i64) -> String {
    if bytes < 1024 {
        format!("{bytes} bytes")
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Describe a result value's shape for acknowledgements.
fn describe_shape(value: &Value) -> String {
    match value {
        Value::Null => "an empty result".to_string(),
        Value::Bool(b) => format!("the boolean {b}"),
        Value::Int(i) => format!("the number {i}"),
        Value::Float(f) => format!("the number {f}"),
        Value::String(s) => format!("the text \"{s}\""),
        Value::Bytes(b) => format!("{} bytes of binary data", b.len()),
        Value::Array(items) => format!("a list of {} items", items.len()),
        Value::Object(map) => {
            let keys: Vec<&str> = map.keys().take(5).map(String::as_str).collect();
            format!("an object with keys {}", keys.join(", "))
        }
    }
}

pub fn render_handshake(payload: &Value) -> Rendered {
    let features = payload.get("negotiated").unwrap_or(payload);
    let transport = payload.str_or("transport", "an unspecified transport");
    let codec = payload.str_or("codec", "the default codec");
    let compression = features.str_or("compression", "none");
    let fec = features.get("fec").and_then(Value::as_bool).unwrap_or(false);
    let crypto = features.get("crypto").and_then(Value::as_bool).unwrap_or(false);
    let mtu = features.get("maxMtu").and_then(Value::as_i64).unwrap_or(1500);

    let text = format!(
        "Peers completed a handshake over {transport} using the {codec} codec: compression {}, \
         FEC {}, encryption {}, frames up to {}.",
        if compression == "none" { "off".to_string() } else { compression.to_string() },
        if fec { "on" } else { "off" },
        if crypto { "on" } else { "off" },
        format_mtu(mtu),
    );

    Rendered::new(text, 1.0)
        .field("transport", transport.to_string(), "transport")
        .field("codec", codec.to_string(), "codec")
        .field("compression", compression.to_string(), "negotiated.compression")
        .field("fec", fec.to_string(), "negotiated.fec")
        .field("crypto", crypto.to_string(), "negotiated.crypto")
        .field("maxMtu", mtu.to_string(), "negotiated.maxMtu")
}

pub fn render_compute_request(payload: &Value) -> Rendered {
    let op = payload.str_or("op", "an operation");
    let from = payload.str_or("from", "A");
    let to = payload.str_or("to", "B");
    let args = payload.get("args").map(brief_entries).unwrap_or_default();

    let mut text = format!(
        "agent {from} asked agent {to} to perform \"{op}\" with {args} and return the result"
    );
    let mut rendered = Rendered::new(String::new(), 1.0)
        .field("op", op.to_string(), "op")
        .field("args", args, "args");

    if let Some(id) = payload.get("id").and_then(Value::as_str) {
        text.push_str(&format!(" (request {id})"));
        rendered = rendered.field("id", id.to_string(), "id");
    }
    text.push('.');
    rendered.text = text;
    rendered
}

pub fn render_ack(payload: &Value) -> Rendered {
    let reference = payload
        .get("ack")
        .and_then(Value::as_str)
        .or_else(|| payload.get("ref").and_then(Value::as_str))
        .unwrap_or("an earlier message");
    let shape = payload.get("result").map_or_else(
        || "no result payload".to_string(),
        describe_shape,
    );
    let text = format!("Agent acknowledged message {reference} and returned {shape}.");
    Rendered::new(text, 1.0)
        .field("ack", reference.to_string(), "ack")
        .field("result", shape, "result")
}

pub fn render_error(payload: &Value) -> Rendered {
    let kind = payload.str_or("error", "unspecified");
    let code = payload.get("code").map(brief);
    let details = payload
        .get("message")
        .or_else(|| payload.get("details"))
        .map(brief);

    let mut text = format!("The peer reported a {kind} error");
    if let Some(code) = &code {
        text.push_str(&format!(" (code {code})"));
    }
    if let Some(reference) = payload.get("msgIdRef").and_then(Value::as_str) {
        text.push_str(&format!(" about message {reference}"));
    }
    if let Some(details) = &details {
        text.push_str(&format!(": {details}"));
    }
    text.push('.');

    let mut rendered = Rendered::new(text, 1.0).field("error", kind.to_string(), "error");
    if let Some(code) = code {
        rendered = rendered.field("code", code, "code");
    }
    rendered
}

pub fn render_policy_decision(payload: &Value) -> Rendered {
    let decision = payload.str_or("decision", "evaluated");
    let policy = payload.str_or("policy", "an unnamed policy");
    let resource = payload.str_or("resource", "a resource");
    let actor = payload.str_or("actor", "an agent");
    let verb = match decision {
        "allow" | "allowed" => "allowed",
        "deny" | "denied" => "denied",
        other => other,
    };

    let mut text = format!("Policy {policy} {verb} {actor} access to {resource}");
    if let Some(reason) = payload.get("reason").and_then(Value::as_str) {
        text.push_str(&format!(" because {reason}"));
    }
    text.push('.');

    Rendered::new(text, 1.0)
        .field("decision", verb.to_string(), "decision")
        .field("policy", policy.to_string(), "policy")
        .field("actor", actor.to_string(), "actor")
}

pub fn render_sensor_status(payload: &Value) -> Rendered {
    let sensor = payload
        .get("sensor")
        .or_else(|| payload.get_path("args.sensor"))
        .map_or("a sensor", |v| v.as_str().unwrap_or("a sensor"));

    let mut clauses: Vec<String> = Vec::new();
    let readings = payload.get("readings").or_else(|| payload.get("args")).unwrap_or(payload);

    if let Some(temp) = readings
        .get("temperature")
        .or_else(|| readings.get("temp"))
        .and_then(Value::as_f64)
    {
        let qualifier = if temp > 30.0 {
            " — high (above 30)"
        } else if temp < 10.0 {
            " — low (below 10)"
        } else {
            ""
        };
        clauses.push(format!("temperature {temp}{qualifier}"));
    }
    if let Some(battery) = readings.get("battery").and_then(Value::as_f64) {
        let qualifier = if battery <= 20.0 { " — critically low" } else { "" };
        clauses.push(format!("battery {battery}%{qualifier}"));
    }
    if let Some(status) = readings.get("status").and_then(Value::as_str) {
        clauses.push(format!("status {status}"));
    }

    let (text, confidence) = if clauses.is_empty() {
        (format!("Sensor {sensor} sent a status update."), 0.6)
    } else {
        (format!("Sensor {sensor} reported {}.", clauses.join(", ")), 1.0)
    };

    Rendered::new(text, confidence).field("sensor", sensor.to_string(), "sensor")
}

pub fn render_audio_error(payload: &Value) -> Rendered {
    let code = payload.get("code").and_then(Value::as_i64).unwrap_or(500);
    let explanation = match code {
        400 => "the request was malformed",
        403 => "access was denied",
        404 => "nothing was found at that address",
        500 => "the peer hit an internal failure",
        _ => "the peer reported a failure",
    };
    let text = format!("Audio link error {code}: {explanation}.");
    Rendered::new(text, 1.0).field("code", code.to_string(), "code")
}

/// Structural fallback for unrecognized payloads.
pub fn render_generic(payload: &Value) -> Rendered {
    let (text, bullets) = match payload.as_object() {
        Some(map) => {
            let bullets: Vec<String> =
                map.iter().take(5).map(|(k, v)| format!("{k}: {}", brief(v))).collect();
            (
                format!("A message with {} fields arrived.", map.len()),
                if bullets.is_empty() { None } else { Some(bullets) },
            )
        }
        None => (format!("A message arrived: {}.", brief(payload)), None),
    };

    let mut rendered = Rendered::new(text, 0.3);
    rendered.bullets = bullets;
    rendered
}
