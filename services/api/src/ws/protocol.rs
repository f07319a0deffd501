//! Defines the media-stream message protocol between the telephony platform and the bridge.

use serde::{Deserialize, Serialize};

/// Messages sent by the telephony platform over the media stream.
#[derive(Deserialize, Debug)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyEvent {
    /// The stream is established; carries the correlation identifiers.
    Start { start: StreamStart },
    /// One frame of caller audio (base64 8kHz μ-law).
    Media { media: MediaPayload },
    /// The stream has ended.
    Stop {},
    /// `connected`, `mark`, `dtmf` and anything newer are ignored.
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct StreamStart {
    pub stream_sid: String,
    #[serde(default)]
    pub call_sid: Option<String>,
    #[serde(default)]
    pub custom_parameters: CustomParameters,
}

/// `<Parameter>` values attached to the stream by the call webhook.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct CustomParameters {
    pub call_sid: Option<String>,
    pub caller_phone: Option<String>,
    pub called_number: Option<String>,
}

#[derive(Deserialize, Debug, Clone)]
pub struct MediaPayload {
    pub payload: String,
}

/// Messages sent from the bridge to the telephony platform.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum TelephonyCommand {
    /// Plays one frame of assistant audio (base64 8kHz μ-law).
    Media {
        #[serde(rename = "streamSid")]
        stream_sid: String,
        media: OutboundMedia,
    },
    /// Discards any assistant audio still buffered on the platform.
    Clear {
        #[serde(rename = "streamSid")]
        stream_sid: String,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct OutboundMedia {
    pub payload: String,
}
