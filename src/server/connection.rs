//! Per-connection protocol loop.
//!
//! A connection owns its session's lock for as long as it is open, so every
//! mutation of that session happens sequentially on this task. Frames that
//! arrive while a turn runs are queued and handled after `response.end`.

use crate::error::{Result, VocaliveError};
use crate::pipeline::events::EventSender;
use crate::pipeline::turn::{TurnInput, TurnPipeline};
use crate::server::protocol::{ClientMessage, ConfigEcho, InboundFrame, ParsedMessage, ServerEvent};
use crate::session::registry::SessionRegistry;
use crate::session::state::SessionState;
use futures_util::{Stream, StreamExt};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Why the loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Disconnected,
    Deleted,
}

/// Drive one client connection for session `id` until it disconnects.
///
/// Unknown ids get a default session. When the connection ends the session is
/// removed from `registry`.
pub async fn serve_connection<S>(
    registry: Arc<SessionRegistry>,
    id: Uuid,
    mut inbound: S,
    events: EventSender,
) where
    S: Stream<Item = InboundFrame> + Unpin,
{
    let (handle, _) = registry.get_or_create(id);
    let Ok(state) = Arc::clone(&handle.state).try_lock_owned() else {
        tracing::warn!(session = %id, "Rejecting second connection for session");
        let busy = VocaliveError::SessionBusy { id: id.to_string() };
        if let Err(e) = events.error(busy.to_string()).and_then(|_| events.close()) {
            tracing::debug!(session = %id, error = %e, "Client left before rejection was sent");
        }
        return;
    };
    tracing::info!(session = %id, "WebSocket connected");

    let mut handler = ConnectionHandler {
        pipeline: TurnPipeline::new(events.clone()),
        events,
        state,
        pending: VecDeque::new(),
        cancel: handle.cancel.clone(),
    };
    match handler.run(&mut inbound).await {
        Ok(Flow::Deleted) => {
            tracing::info!(session = %id, "Session deleted, closing connection");
            if let Err(e) = handler.events.close() {
                tracing::debug!(session = %id, error = %e, "Socket already closed");
            }
        }
        Ok(_) | Err(VocaliveError::ConnectionClosed) => {
            tracing::info!(session = %id, "WebSocket disconnected");
        }
        Err(e) => tracing::error!(session = %id, error = %e, "WebSocket error"),
    }

    drop(handler);
    registry.remove_handle(&handle);
    tracing::info!(session = %id, "Session cleaned up");
}

struct ConnectionHandler {
    state: OwnedMutexGuard<SessionState>,
    events: EventSender,
    pipeline: TurnPipeline,
    pending: VecDeque<InboundFrame>,
    cancel: CancellationToken,
}

impl ConnectionHandler {
    async fn run<S>(&mut self, inbound: &mut S) -> Result<Flow>
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        self.events.send(ServerEvent::SessionCreated {
            session_id: self.state.id().to_string(),
            config: ConfigEcho::created(self.state.config()),
        })?;

        loop {
            let frame = match self.pending.pop_front() {
                Some(frame) => frame,
                None => tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Ok(Flow::Deleted),
                    frame = inbound.next() => match frame {
                        Some(frame) => frame,
                        None => return Ok(Flow::Disconnected),
                    },
                },
            };

            let flow = match frame {
                InboundFrame::Close => Flow::Disconnected,
                InboundFrame::Binary(bytes) => self.on_audio(&bytes, inbound).await?,
                InboundFrame::Text(text) => self.on_text(&text, inbound).await?,
            };
            if flow != Flow::Continue {
                return Ok(flow);
            }
        }
    }

    async fn on_audio<S>(&mut self, bytes: &[u8], inbound: &mut S) -> Result<Flow>
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        let audio = self.state.audio_mut();
        audio.feed(bytes);
        if !audio.ready() {
            return Ok(Flow::Continue);
        }
        let block = audio.drain();
        self.run_turn(TurnInput::Audio(block), inbound).await
    }

    async fn on_text<S>(&mut self, text: &str, inbound: &mut S) -> Result<Flow>
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        let message = match ClientMessage::parse(text) {
            ParsedMessage::Message(message) => message,
            ParsedMessage::Unknown(kind) => {
                tracing::warn!(session = %self.state.id(), kind = %kind, "Unknown message type");
                return Ok(Flow::Continue);
            }
            ParsedMessage::Malformed(reason) => {
                tracing::warn!(session = %self.state.id(), reason = %reason, "Invalid JSON received");
                return Ok(Flow::Continue);
            }
        };

        match message {
            ClientMessage::SessionUpdate { .. } => {
                if let Some(update) = message.to_update() {
                    self.state.apply_update(&update);
                }
                self.events.send(ServerEvent::SessionUpdated {
                    config: ConfigEcho::updated(self.state.config()),
                })?;
                tracing::info!(session = %self.state.id(), "Session updated");
            }
            ClientMessage::ConversationClear => {
                self.state.clear_history();
                self.events.send(ServerEvent::ConversationCleared)?;
                tracing::info!(session = %self.state.id(), "Conversation cleared");
            }
            ClientMessage::MemoryClear => {
                self.clear_memory().await;
                self.events.send(ServerEvent::MemoryCleared)?;
            }
            ClientMessage::Ping => self.events.send(ServerEvent::Pong)?,
            ClientMessage::InputText { text } => {
                return self.run_turn(TurnInput::Text(text), inbound).await;
            }
        }
        Ok(Flow::Continue)
    }

    async fn clear_memory(&self) {
        let memory = Arc::clone(&self.state.backends().memory);
        if !memory.is_enabled() {
            return;
        }
        let user_id = self.state.config().user_id.clone();
        match memory.clear_user(&user_id).await {
            Ok(()) => tracing::info!(session = %self.state.id(), user = %user_id, "Memories cleared"),
            Err(e) => tracing::warn!(session = %self.state.id(), error = %e, "Failed to clear memories"),
        }
    }

    /// Run one turn while still watching the socket.
    ///
    /// Frames read meanwhile are queued. A disconnect or a deletion drops the
    /// turn where it stands.
    async fn run_turn<S>(&mut self, input: TurnInput, inbound: &mut S) -> Result<Flow>
    where
        S: Stream<Item = InboundFrame> + Unpin,
    {
        let Self {
            state,
            pipeline,
            pending,
            cancel,
            ..
        } = self;
        let session = state.id();
        let turn = pipeline.run(state, input);
        tokio::pin!(turn);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(session = %session, "Turn aborted by session deletion");
                    return Ok(Flow::Deleted);
                }
                outcome = &mut turn => {
                    let outcome = outcome?;
                    tracing::debug!(session = %session, ?outcome, "Turn finished");
                    return Ok(Flow::Continue);
                }
                frame = inbound.next() => match frame {
                    Some(InboundFrame::Close) | None => {
                        tracing::debug!(session = %session, "Turn aborted by disconnect");
                        return Ok(Flow::Disconnected);
                    }
                    Some(frame) => pending.push_back(frame),
                },
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::{Backends, SharedSynthesizer, SharedTranscriber};
    use crate::llm::generator::MockGenerator;
    use crate::memory::store::MockMemory;
    use crate::server::protocol::OutboundFrame;
    use crate::session::config::SessionConfig;
    use crate::stt::transcriber::MockTranscriber;
    use crate::tts::synthesizer::{MockSynthesizer, SynthesisEngine};
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn registry() -> Arc<SessionRegistry> {
        let backends = Backends::new(
            Arc::new(|| -> Result<SharedTranscriber> { Ok(Arc::new(MockTranscriber::new("mock"))) }),
            Arc::new(|engine: SynthesisEngine| -> Result<SharedSynthesizer> {
                Ok(Arc::new(MockSynthesizer::new(engine)))
            }),
            Arc::new(MockGenerator::new()),
            Arc::new(MockMemory::new().disabled()),
        );
        Arc::new(SessionRegistry::new(Arc::new(backends), SessionConfig::default()))
    }

    fn inbound(
        rx: mpsc::UnboundedReceiver<InboundFrame>,
    ) -> impl Stream<Item = InboundFrame> + Unpin {
        Box::pin(futures_util::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|frame| (frame, rx))
        }))
    }

    fn kind(frame: &OutboundFrame) -> String {
        match frame {
            OutboundFrame::Event(event) => event.kind().to_string(),
            OutboundFrame::Audio(_) => "<audio>".to_string(),
            OutboundFrame::Close => "<close>".to_string(),
        }
    }

    async fn next_kind(out: &mut mpsc::UnboundedReceiver<OutboundFrame>) -> String {
        match tokio::time::timeout(Duration::from_secs(5), out.recv()).await {
            Ok(Some(frame)) => kind(&frame),
            Ok(None) => "<eof>".to_string(),
            Err(_) => panic!("Timed out waiting for a frame"),
        }
    }

    fn text(json: &str) -> InboundFrame {
        InboundFrame::Text(json.to_string())
    }

    #[tokio::test]
    async fn test_control_messages_then_disconnect() {
        let registry = registry();
        let id = Uuid::new_v4();
        let script = futures_util::stream::iter(vec![
            text(r#"{"type":"ping"}"#),
            text(r#"{"type":"conversation.clear"}"#),
            text(r#"{"type":"memory.clear"}"#),
        ]);
        let (events, mut out) = EventSender::channel();

        serve_connection(registry.clone(), id, script, events).await;

        let mut kinds = Vec::new();
        while let Ok(frame) = out.try_recv() {
            kinds.push(kind(&frame));
        }
        assert_eq!(
            kinds,
            vec!["session.created", "pong", "conversation.cleared", "memory.cleared"]
        );
        assert!(!registry.contains(id), "session removed on disconnect");
    }

    #[tokio::test]
    async fn test_close_frame_stops_processing() {
        let script = futures_util::stream::iter(vec![InboundFrame::Close, text(r#"{"type":"ping"}"#)]);
        let (events, mut out) = EventSender::channel();

        serve_connection(registry(), Uuid::new_v4(), script, events).await;

        assert_eq!(next_kind(&mut out).await, "session.created");
        assert_eq!(next_kind(&mut out).await, "<eof>");
    }

    #[tokio::test]
    async fn test_frames_during_turn_are_handled_after_it() {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, mut out) = EventSender::channel();
        let task = tokio::spawn(serve_connection(registry(), Uuid::new_v4(), inbound(rx), events));

        tx.send(text(r#"{"type":"input.text","text":"Salut"}"#)).unwrap();
        tx.send(text(r#"{"type":"ping"}"#)).unwrap();

        let mut kinds = Vec::new();
        loop {
            let next = next_kind(&mut out).await;
            let done = next == "pong";
            kinds.push(next);
            if done {
                break;
            }
        }
        drop(tx);
        task.await.unwrap();

        let end = kinds.iter().position(|k| k == "response.end").unwrap();
        assert_eq!(end, kinds.len() - 2, "ping answered right after the turn: {:?}", kinds);
    }

    #[tokio::test]
    async fn test_second_connection_is_rejected() {
        let registry = registry();
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, mut out) = EventSender::channel();
        let first = tokio::spawn(serve_connection(registry.clone(), id, inbound(rx), events));
        assert_eq!(next_kind(&mut out).await, "session.created");

        let (events, mut rejected) = EventSender::channel();
        serve_connection(registry.clone(), id, futures_util::stream::pending(), events).await;

        assert_eq!(next_kind(&mut rejected).await, "error");
        assert_eq!(next_kind(&mut rejected).await, "<close>");
        assert!(registry.contains(id), "first connection keeps the session");

        drop(tx);
        first.await.unwrap();
        assert!(!registry.contains(id));
    }

    #[tokio::test]
    async fn test_deleted_session_closes_connection() {
        let registry = registry();
        let id = registry.create(SessionConfig::default());
        let (_tx, rx) = mpsc::unbounded_channel::<InboundFrame>();
        let (events, mut out) = EventSender::channel();
        let task = tokio::spawn(serve_connection(registry.clone(), id, inbound(rx), events));
        assert_eq!(next_kind(&mut out).await, "session.created");

        assert!(registry.remove(id));
        task.await.unwrap();

        assert_eq!(next_kind(&mut out).await, "<close>");
    }
}
