//! The per-call state machine joining a telephony media stream to a realtime
//! model connection.
//!
//! A `CallBridge` moves through `AwaitingStart → Active → Ended`. It is driven
//! by a single task (see `session.rs`) that feeds it telephony events and
//! realtime events one at a time, so no two events of a call ever interleave.

use super::{
    cycle::ToolLink,
    protocol::{OutboundMedia, StreamStart, TelephonyCommand, TelephonyEvent},
    provider::{
        RealtimeLegEvent,
        events::{
            AUDIO_FORMAT_PCM16, AudioTranscription, ClientEvent, ResponseConfig, ServerEvent,
            SessionConfig, ToolDefinition, TurnDetection, text_and_audio,
        },
    },
};
use crate::{audio_utils, config::Config, registry::ActiveCall, state::AppState};
use anyhow::Result;
use chrono::Utc;
use hostline_core::{
    menu::{MenuQuery, Restaurant},
    prompt::{greeting_instructions, render_system_prompt},
    session::{CallIdentity, CallSession},
    store::{CallLogUpdate, NewTranscript, RecordStore, TranscriptRole},
    tools::OrderDesk,
};
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::mpsc::{self, error::TrySendError},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

/// How long the realtime connection gets to close cleanly when a call ends.
const REALTIME_CLOSE_GRACE: Duration = Duration::from_secs(2);
/// Longest a control event may wait for room on the realtime leg.
const CONTROL_SEND_TIMEOUT: Duration = Duration::from_secs(1);

/// Whether the telephony connection should stay open after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Hangup,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallPhase {
    AwaitingStart,
    Active,
    Ended,
}

enum Phase {
    AwaitingStart,
    Active(Box<LiveCall>),
    Ended,
}

/// Everything that exists only while a call is active.
struct LiveCall {
    session: CallSession,
    realtime: Option<mpsc::Sender<ClientEvent>>,
    realtime_task: Option<JoinHandle<()>>,
    tools: ToolLink,
}

pub struct CallBridge {
    state: Arc<AppState>,
    telephony: mpsc::Sender<TelephonyCommand>,
    phase: Phase,
    pending_events: Option<mpsc::Receiver<RealtimeLegEvent>>,
}

impl CallBridge {
    pub fn new(state: Arc<AppState>, telephony: mpsc::Sender<TelephonyCommand>) -> Self {
        Self {
            state,
            telephony,
            phase: Phase::AwaitingStart,
            pending_events: None,
        }
    }

    pub fn phase(&self) -> CallPhase {
        match self.phase {
            Phase::AwaitingStart => CallPhase::AwaitingStart,
            Phase::Active(_) => CallPhase::Active,
            Phase::Ended => CallPhase::Ended,
        }
    }

    /// Hands over the realtime event stream once the realtime leg is open.
    pub fn take_realtime_events(&mut self) -> Option<mpsc::Receiver<RealtimeLegEvent>> {
        self.pending_events.take()
    }

    pub async fn handle_telephony(&mut self, event: TelephonyEvent) -> Flow {
        match event {
            TelephonyEvent::Start { start } => {
                if !matches!(self.phase, Phase::AwaitingStart) {
                    warn!("Ignoring repeated start event");
                    return Flow::Continue;
                }
                match self.start(start).await {
                    Ok(flow) => flow,
                    Err(e) => {
                        error!(error = ?e, "Failed to set up call");
                        self.finish().await;
                        Flow::Hangup
                    }
                }
            }
            TelephonyEvent::Media { media } => {
                self.forward_caller_audio(&media.payload);
                Flow::Continue
            }
            TelephonyEvent::Stop {} => {
                info!("Telephony stream stopped.");
                self.finish().await;
                Flow::Hangup
            }
            TelephonyEvent::Other => Flow::Continue,
        }
    }

    pub async fn handle_realtime(&mut self, event: RealtimeLegEvent) {
        let Phase::Active(live) = &mut self.phase else {
            debug!(?event, "Ignoring realtime event outside an active call");
            return;
        };
        match event {
            RealtimeLegEvent::Server(event) => {
                live.on_server_event(event, &self.telephony, &self.state.store)
                    .await
            }
            RealtimeLegEvent::Closed(reason) => {
                warn!(?reason, "Realtime leg closed; the call stays up without assistant audio");
                live.realtime = None;
                live.session.set_response_in_flight(false);
            }
        }
    }

    /// Ends the call. Safe to call more than once.
    pub async fn finish(&mut self) {
        self.pending_events = None;
        let Phase::Active(live) = std::mem::replace(&mut self.phase, Phase::Ended) else {
            return;
        };
        let LiveCall {
            session,
            realtime,
            realtime_task,
            tools,
        } = *live;

        drop(realtime);
        if let Some(mut task) = realtime_task {
            if tokio::time::timeout(REALTIME_CLOSE_GRACE, &mut task).await.is_err() {
                warn!("Realtime leg did not close in time; aborting it");
                task.abort();
            }
        }
        tools.shutdown();
        self.state
            .registry
            .remove(session.call_sid(), session.stream_sid())
            .await;

        let ended_at = Utc::now();
        let duration_secs = session.duration_secs(ended_at);
        info!(duration_secs, "Call ended.");

        let Some(call_log_id) = session.call_log_id() else {
            return;
        };
        let store = self.state.store.clone();
        let call_sid = session.call_sid().to_string();
        tokio::spawn(async move {
            if let Err(e) = store
                .update_call_log(
                    call_log_id,
                    CallLogUpdate::Completed {
                        ended_at,
                        duration_secs,
                    },
                )
                .await
            {
                warn!(%call_log_id, error = ?e, "Failed to complete call log");
            }
            if let Err(e) = store.complete_call_session(&call_sid).await {
                warn!(%call_sid, error = ?e, "Failed to complete call session");
            }
        });
    }

    async fn start(&mut self, start: StreamStart) -> Result<Flow> {
        let identity = self.identity_from(start);
        let span = tracing::Span::current();
        span.record("call_sid", identity.call_sid.as_str());
        span.record("stream_sid", identity.stream_sid.as_str());
        info!(
            caller = ?identity.caller_phone,
            called = ?identity.called_number,
            "Media stream started."
        );

        let Some(restaurant) = self
            .resolve_restaurant(identity.called_number.as_deref())
            .await
        else {
            warn!("No restaurant is configured; hanging up.");
            self.phase = Phase::Ended;
            return Ok(Flow::Hangup);
        };

        let call_log_id = match self.state.store.find_call_log(&identity.call_sid).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = ?e, "Call log lookup failed; transcripts will not be kept");
                None
            }
        };
        let menu = match self
            .state
            .store
            .list_menu_items(restaurant.id, &MenuQuery::default())
            .await
        {
            Ok(menu) => menu,
            Err(e) => {
                error!(error = ?e, "Menu lookup failed; continuing with an empty menu");
                Vec::new()
            }
        };
        let instructions = render_system_prompt(&self.state.system_prompt, &restaurant, &menu);

        let session = CallSession::new(identity, restaurant, call_log_id);
        let desk = OrderDesk::new(
            session.restaurant().id,
            call_log_id,
            self.state.store.clone(),
            session.order(),
        );
        let tools = ToolLink::start(desk).await?;

        self.state
            .registry
            .insert(
                session.call_sid(),
                ActiveCall {
                    stream_sid: session.stream_sid().to_string(),
                    restaurant: session.restaurant().name.clone(),
                    started_at: session.started_at(),
                },
            )
            .await;
        info!(
            restaurant = %session.restaurant().name,
            menu_items = menu.len(),
            ?call_log_id,
            "Call is active."
        );

        self.phase = Phase::Active(Box::new(LiveCall {
            session,
            realtime: None,
            realtime_task: None,
            tools,
        }));
        self.open_realtime_leg(instructions).await;
        Ok(Flow::Continue)
    }

    fn identity_from(&self, start: StreamStart) -> CallIdentity {
        let custom = start.custom_parameters;
        let call_sid = non_blank(custom.call_sid)
            .or_else(|| non_blank(start.call_sid))
            .unwrap_or_else(|| start.stream_sid.clone());
        let called_number = non_blank(custom.called_number)
            .or_else(|| self.state.config.twilio_phone_number.clone());
        CallIdentity {
            call_sid,
            stream_sid: start.stream_sid,
            caller_phone: non_blank(custom.caller_phone),
            called_number,
        }
    }

    /// The restaurant for the dialled number, else any restaurant at all.
    async fn resolve_restaurant(&self, called_number: Option<&str>) -> Option<Restaurant> {
        if let Some(number) = called_number {
            match self.state.store.find_restaurant_by_phone(number).await {
                Ok(Some(restaurant)) => return Some(restaurant),
                Ok(None) => debug!(number, "No restaurant for called number; using fallback"),
                Err(e) => error!(error = ?e, "Restaurant lookup failed; using fallback"),
            }
        }
        match self.state.store.any_restaurant().await {
            Ok(restaurant) => restaurant,
            Err(e) => {
                error!(error = ?e, "Fallback restaurant lookup failed");
                None
            }
        }
    }

    async fn open_realtime_leg(&mut self, instructions: String) {
        let Phase::Active(live) = &mut self.phase else {
            return;
        };
        let leg = match self.state.connector.connect(live.session.call_sid()).await {
            Ok(leg) => leg,
            Err(e) => {
                error!(error = ?e, "Could not open the realtime leg; the call stays up without assistant audio");
                return;
            }
        };
        let tools = match live.tools.definitions().await {
            Ok(tools) => tools,
            Err(e) => {
                error!(error = ?e, "Could not list order desk tools");
                Vec::new()
            }
        };

        let update = session_update(
            &self.state.config,
            live.session.restaurant(),
            instructions,
            tools,
        );
        if leg.tx.send(update).await.is_err() {
            warn!("Realtime leg closed before the session could be configured");
        }
        live.realtime = Some(leg.tx);
        live.realtime_task = Some(leg.handle);
        self.pending_events = Some(leg.rx);
    }

    fn forward_caller_audio(&self, payload: &str) {
        let Phase::Active(live) = &self.phase else {
            return;
        };
        let Some(realtime) = &live.realtime else {
            return;
        };
        let audio = match audio_utils::telephony_to_ai_leg(payload) {
            Ok(audio) => audio,
            Err(e) => {
                warn!(error = %e, "Dropping malformed caller audio frame");
                return;
            }
        };
        match realtime.try_send(ClientEvent::InputAudioBufferAppend { audio }) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Realtime leg is backed up; dropping caller audio frame")
            }
        }
    }
}

impl LiveCall {
    async fn on_server_event(
        &mut self,
        event: ServerEvent,
        telephony: &mpsc::Sender<TelephonyCommand>,
        store: &Arc<dyn RecordStore>,
    ) {
        if !matches!(event, ServerEvent::ResponseAudioDelta { .. }) {
            debug!(?event, "Realtime event");
        }
        match event {
            ServerEvent::SessionUpdated {} => {
                if self.session.take_greeting() {
                    info!("Session configured; greeting the caller.");
                    let instructions = greeting_instructions(self.session.restaurant());
                    self.send_realtime(ClientEvent::ResponseCreate {
                        response: Some(ResponseConfig {
                            modalities: text_and_audio(),
                            instructions,
                        }),
                    })
                    .await;
                }
            }
            ServerEvent::ResponseCreated {} => self.session.set_response_in_flight(true),
            ServerEvent::ResponseDone {} => self.session.set_response_in_flight(false),
            ServerEvent::ResponseAudioDelta { delta } => self.play_assistant_audio(&delta, telephony),
            ServerEvent::SpeechStarted {} => self.barge_in(telephony).await,
            ServerEvent::InputTranscriptionCompleted { transcript } => {
                self.record_transcript(TranscriptRole::Caller, transcript, store)
            }
            ServerEvent::ResponseTranscriptDone { transcript } => {
                self.record_transcript(TranscriptRole::Ai, transcript, store)
            }
            ServerEvent::FunctionCallArgumentsDone {
                name,
                arguments,
                call_id,
            } => {
                info!(tool = %name, %call_id, "Model requested a tool call");
                let output = self.tools.dispatch(&name, &arguments).await;
                self.send_realtime(ClientEvent::function_call_output(call_id, output))
                    .await;
                self.send_realtime(ClientEvent::ResponseCreate { response: None })
                    .await;
            }
            ServerEvent::Error { error } => {
                error!(
                    kind = ?error.kind,
                    code = ?error.code,
                    message = %error.message,
                    "Realtime leg reported an error"
                );
            }
            ServerEvent::Other => {}
        }
    }

    /// Caller started talking over the assistant: cancel, then flush queued audio.
    async fn barge_in(&mut self, telephony: &mpsc::Sender<TelephonyCommand>) {
        if self.session.response_in_flight() {
            self.send_realtime(ClientEvent::ResponseCancel).await;
            self.session.set_response_in_flight(false);
        }
        let clear = TelephonyCommand::Clear {
            stream_sid: self.session.stream_sid().to_string(),
        };
        if telephony.send(clear).await.is_err() {
            debug!("Telephony writer is gone; clear not sent");
        }
    }

    fn play_assistant_audio(&self, delta: &str, telephony: &mpsc::Sender<TelephonyCommand>) {
        let payload = match audio_utils::ai_leg_to_telephony(delta) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Dropping malformed assistant audio chunk");
                return;
            }
        };
        let media = TelephonyCommand::Media {
            stream_sid: self.session.stream_sid().to_string(),
            media: OutboundMedia { payload },
        };
        match telephony.try_send(media) {
            Ok(()) | Err(TrySendError::Closed(_)) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Telephony leg is backed up; dropping assistant audio chunk")
            }
        }
    }

    fn record_transcript(
        &self,
        role: TranscriptRole,
        text: String,
        store: &Arc<dyn RecordStore>,
    ) {
        let Some(call_log_id) = self.session.call_log_id() else {
            return;
        };
        if text.trim().is_empty() {
            return;
        }
        let store = store.clone();
        let transcript = NewTranscript {
            call_log_id,
            role,
            text,
            timestamp: Utc::now(),
        };
        tokio::spawn(async move {
            if let Err(e) = store.insert_transcript(transcript).await {
                warn!(%call_log_id, %role, error = ?e, "Failed to save transcript");
            }
        });
    }

    /// Sends a control event, giving up after `CONTROL_SEND_TIMEOUT` so a
    /// stalled realtime leg cannot stall the call's event loop.
    async fn send_realtime(&self, event: ClientEvent) {
        let Some(realtime) = &self.realtime else {
            return;
        };
        match tokio::time::timeout(CONTROL_SEND_TIMEOUT, realtime.send(event)).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Realtime leg is gone; control event dropped"),
            Err(_) => warn!("Realtime leg is not draining; control event dropped"),
        }
    }
}

fn session_update(
    config: &Config,
    restaurant: &Restaurant,
    instructions: String,
    tools: Vec<ToolDefinition>,
) -> ClientEvent {
    ClientEvent::SessionUpdate {
        session: SessionConfig {
            modalities: text_and_audio(),
            instructions,
            voice: restaurant.voice().to_string(),
            input_audio_format: AUDIO_FORMAT_PCM16.to_string(),
            output_audio_format: AUDIO_FORMAT_PCM16.to_string(),
            input_audio_transcription: AudioTranscription {
                model: config.transcription_model.clone(),
            },
            turn_detection: TurnDetection::phone_call(),
            tools,
        },
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
