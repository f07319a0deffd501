//! Realtime API wire events used by the bridge.
//!
//! Only the events the bridge sends or reacts to are modelled; every other
//! server event deserializes to `ServerEvent::Other`.

use serde::{Deserialize, Serialize};

pub const AUDIO_FORMAT_PCM16: &str = "pcm16";

// --- Client → server ---

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ClientEvent {
    #[serde(rename = "session.update")]
    SessionUpdate { session: SessionConfig },
    #[serde(rename = "input_audio_buffer.append")]
    InputAudioBufferAppend { audio: String },
    #[serde(rename = "response.create")]
    ResponseCreate {
        #[serde(skip_serializing_if = "Option::is_none")]
        response: Option<ResponseConfig>,
    },
    #[serde(rename = "response.cancel")]
    ResponseCancel,
    #[serde(rename = "conversation.item.create")]
    ConversationItemCreate { item: ConversationItem },
}

impl ClientEvent {
    pub fn function_call_output(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        ClientEvent::ConversationItemCreate {
            item: ConversationItem::FunctionCallOutput {
                call_id: call_id.into(),
                output: output.into(),
            },
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct SessionConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
    pub voice: String,
    pub input_audio_format: String,
    pub output_audio_format: String,
    pub input_audio_transcription: AudioTranscription,
    pub turn_detection: TurnDetection,
    pub tools: Vec<ToolDefinition>,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AudioTranscription {
    pub model: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnDetection {
    ServerVad {
        threshold: f32,
        prefix_padding_ms: u32,
        silence_duration_ms: u32,
    },
}

impl TurnDetection {
    /// Voice-activity settings tuned for 8kHz phone audio.
    pub fn phone_call() -> Self {
        TurnDetection::ServerVad {
            threshold: 0.5,
            prefix_padding_ms: 300,
            silence_duration_ms: 600,
        }
    }
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ToolDefinition {
    Function {
        name: String,
        description: String,
        parameters: serde_json::Value,
    },
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct ResponseConfig {
    pub modalities: Vec<String>,
    pub instructions: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationItem {
    FunctionCallOutput { call_id: String, output: String },
}

pub fn text_and_audio() -> Vec<String> {
    vec!["text".to_string(), "audio".to_string()]
}

// --- Server → client ---

#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type")]
pub enum ServerEvent {
    #[serde(rename = "session.updated")]
    SessionUpdated {},
    #[serde(rename = "response.created")]
    ResponseCreated {},
    #[serde(rename = "response.done")]
    ResponseDone {},
    #[serde(rename = "response.audio.delta")]
    ResponseAudioDelta { delta: String },
    #[serde(rename = "input_audio_buffer.speech_started")]
    SpeechStarted {},
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "response.audio_transcript.done")]
    ResponseTranscriptDone {
        #[serde(default)]
        transcript: String,
    },
    #[serde(rename = "response.function_call_arguments.done")]
    FunctionCallArgumentsDone {
        name: String,
        #[serde(default)]
        arguments: String,
        call_id: String,
    },
    #[serde(rename = "error")]
    Error { error: ErrorDetail },
    #[serde(other)]
    Other,
}

#[derive(Deserialize, Debug, Clone, PartialEq, Default)]
pub struct ErrorDetail {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_session_update_shape() {
        let event = ClientEvent::SessionUpdate {
            session: SessionConfig {
                modalities: text_and_audio(),
                instructions: "Be brief.".to_string(),
                voice: "alloy".to_string(),
                input_audio_format: AUDIO_FORMAT_PCM16.to_string(),
                output_audio_format: AUDIO_FORMAT_PCM16.to_string(),
                input_audio_transcription: AudioTranscription {
                    model: "whisper-1".to_string(),
                },
                turn_detection: TurnDetection::phone_call(),
                tools: vec![ToolDefinition::Function {
                    name: "get_current_order".to_string(),
                    description: "Get the order.".to_string(),
                    parameters: json!({"type": "object", "properties": {}}),
                }],
            },
        };

        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "session.update");
        assert_eq!(value["session"]["modalities"], json!(["text", "audio"]));
        assert_eq!(value["session"]["input_audio_format"], "pcm16");
        assert_eq!(value["session"]["output_audio_format"], "pcm16");
        assert_eq!(
            value["session"]["turn_detection"],
            json!({"type": "server_vad", "threshold": 0.5, "prefix_padding_ms": 300, "silence_duration_ms": 600})
        );
        assert_eq!(value["session"]["tools"][0]["type"], "function");
        assert_eq!(value["session"]["tools"][0]["name"], "get_current_order");
    }

    #[test]
    fn test_control_events_shape() {
        assert_eq!(
            serde_json::to_value(ClientEvent::ResponseCancel).unwrap(),
            json!({"type": "response.cancel"})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::ResponseCreate { response: None }).unwrap(),
            json!({"type": "response.create"})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::function_call_output("call_1", "Added.")).unwrap(),
            json!({"type": "conversation.item.create", "item": {"type": "function_call_output", "call_id": "call_1", "output": "Added."}})
        );
        assert_eq!(
            serde_json::to_value(ClientEvent::InputAudioBufferAppend {
                audio: "AAA=".to_string()
            })
            .unwrap(),
            json!({"type": "input_audio_buffer.append", "audio": "AAA="})
        );
    }

    #[test]
    fn test_server_event_parsing() {
        let parse = |v: serde_json::Value| serde_json::from_value::<ServerEvent>(v).unwrap();

        assert_eq!(
            parse(json!({"type": "session.updated", "event_id": "e1", "session": {"id": "s1"}})),
            ServerEvent::SessionUpdated {}
        );
        assert_eq!(
            parse(json!({"type": "response.audio.delta", "response_id": "r1", "delta": "AAA="})),
            ServerEvent::ResponseAudioDelta {
                delta: "AAA=".to_string()
            }
        );
        assert_eq!(
            parse(json!({
                "type": "response.function_call_arguments.done",
                "name": "add_order_item",
                "arguments": "{\"item_name\":\"calzone\"}",
                "call_id": "call_9",
                "item_id": "item_1",
                "output_index": 0
            })),
            ServerEvent::FunctionCallArgumentsDone {
                name: "add_order_item".to_string(),
                arguments: "{\"item_name\":\"calzone\"}".to_string(),
                call_id: "call_9".to_string(),
            }
        );
        assert_eq!(
            parse(json!({"type": "error", "error": {"type": "invalid_request_error", "message": "bad"}})),
            ServerEvent::Error {
                error: ErrorDetail {
                    kind: Some("invalid_request_error".to_string()),
                    code: None,
                    message: "bad".to_string(),
                }
            }
        );
        assert_eq!(
            parse(json!({"type": "rate_limits.updated", "rate_limits": []})),
            ServerEvent::Other
        );
    }
}
