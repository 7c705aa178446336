//! Evento entrante del tópico de alarmas.
//!
//! Forma: `{"Records":[{"Sns":{"Message": ..., "Subject": ...}}]}`.
//! El `Message` puede venir como objeto JSON, como string con JSON adentro o
//! como texto plano.

use serde::Deserialize;
use serde_json::Value;

use crate::error::EventError;

const UNKNOWN: &str = "Unknown";

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventRecord {
    #[serde(rename = "Sns")]
    pub sns: SnsEnvelope,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SnsEnvelope {
    #[serde(rename = "Message", default)]
    pub message: Value,
    #[serde(rename = "Subject", default)]
    pub subject: Option<String>,
}

/// Campos de la alarma que nos interesan. JSON `null` cuenta como ausente.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AlarmMessage {
    #[serde(rename = "AlarmName", default)]
    pub alarm_name: Option<String>,
    #[serde(rename = "AlarmDescription", default)]
    pub alarm_description: Option<String>,
    #[serde(rename = "Reason", default)]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmPayload {
    /// El mensaje ya venía estructurado (objeto, o string con JSON de objeto).
    Structured(AlarmMessage),
    /// Texto opaco que no es JSON de objeto.
    Opaque(String),
}

impl AlarmPayload {
    /// Un único paso de parseo tipado sobre el campo `Message`.
    pub fn from_message(message: &Value) -> Self {
        match message {
            Value::Object(_) => Self::structured_or_opaque(message.clone(), message.to_string()),
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(inner @ Value::Object(_)) => Self::structured_or_opaque(inner, raw.clone()),
                _ => AlarmPayload::Opaque(raw.clone()),
            },
            Value::Null => AlarmPayload::Opaque(String::new()),
            other => AlarmPayload::Opaque(other.to_string()),
        }
    }

    fn structured_or_opaque(obj: Value, raw: String) -> Self {
        match serde_json::from_value::<AlarmMessage>(obj) {
            Ok(msg) => AlarmPayload::Structured(msg),
            Err(_) => AlarmPayload::Opaque(raw),
        }
    }

    pub fn alarm_name(&self) -> &str {
        match self {
            AlarmPayload::Structured(m) => m.alarm_name.as_deref().unwrap_or(UNKNOWN),
            AlarmPayload::Opaque(_) => UNKNOWN,
        }
    }

    /// Descripción de la alarma, si no `Reason`, si no "Unknown".
    pub fn reason(&self) -> &str {
        match self {
            AlarmPayload::Structured(m) => m
                .alarm_description
                .as_deref()
                .or(m.reason.as_deref())
                .unwrap_or(UNKNOWN),
            AlarmPayload::Opaque(_) => UNKNOWN,
        }
    }
}

/// Alarma extraída del primer registro del evento.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmEvent {
    pub subject: Option<String>,
    pub payload: AlarmPayload,
}

impl AlarmEvent {
    pub fn from_value(event: Value) -> Result<Self, EventError> {
        let event: NotificationEvent = serde_json::from_value(event)?;
        let record = event
            .records
            .into_iter()
            .next()
            .ok_or(EventError::NoRecords)?;

        Ok(AlarmEvent {
            subject: record.sns.subject,
            payload: AlarmPayload::from_message(&record.sns.message),
        })
    }

    pub fn from_json(raw: &str) -> Result<Self, EventError> {
        let value: Value = serde_json::from_str(raw)?;
        Self::from_value(value)
    }
}
