//! Per-guild playback director: accumulates the two-part voice-gateway
//! handshake (`VOICE_STATE_UPDATE` + `VOICE_SERVER_UPDATE`), owns the voice
//! gateway, a FIFO queue of pending sources, and the 20ms pacing loop that
//! feeds encoded frames into the RTP send path.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use audio::{AudioPipeline, AudioSource, FileSource, SubprocessSource, DEFAULT_BITRATE_BPS, FRAME_DURATION_MS};
use gateway::Gateway;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::warn;
use utils::Snowflake;
use voice::constants::UDP_KEEPALIVE_INTERVAL;
use voice::{VoiceConnectOptions, VoiceGateway};

pub enum DirectorCommand {
  Join { channel_id: Snowflake },
  Leave,
  Play { source: String },
  Skip,
  VoiceSessionId { session_id: String },
  VoiceServer { token: String, endpoint: String }
}

#[derive(Clone)]
pub struct DirectorHandle {
  tx: mpsc::UnboundedSender<DirectorCommand>
}

impl DirectorHandle {
  pub fn send(&self, command: DirectorCommand) {
    let _ = self.tx.send(command);
  }
}

/// Spawns the actor task owning one guild's voice playback state and
/// returns a handle for sending it commands.
pub fn spawn(guild_id: Snowflake, user_id: Snowflake, gateway: Arc<Gateway>) -> DirectorHandle {
  let (tx, rx) = mpsc::unbounded_channel();
  tokio::spawn(run(guild_id, user_id, gateway, rx));
  DirectorHandle { tx }
}

#[derive(Default)]
struct PendingHandshake {
  session_id: Option<String>,
  server: Option<(String, String)>
}

impl PendingHandshake {
  fn take_if_complete(&mut self) -> Option<(String, String, String)> {
    if self.session_id.is_none() || self.server.is_none() {
      return None;
    }
    let session_id = self.session_id.take()?;
    let (token, endpoint) = self.server.take()?;
    Some((session_id, token, endpoint))
  }
}

enum InternalEvent {
  PlaybackFinished
}

struct State {
  guild_id: Snowflake,
  user_id: Snowflake,
  gateway: Arc<Gateway>,
  pending: PendingHandshake,
  voice: Option<Arc<VoiceGateway>>,
  queue: Arc<Mutex<VecDeque<String>>>,
  skip_tx: Option<mpsc::UnboundedSender<()>>,
  playback_task: Option<JoinHandle<()>>,
  internal_tx: mpsc::UnboundedSender<InternalEvent>
}

async fn run(guild_id: Snowflake, user_id: Snowflake, gateway: Arc<Gateway>, mut rx: mpsc::UnboundedReceiver<DirectorCommand>) {
  let (internal_tx, mut internal_rx) = mpsc::unbounded_channel();
  let mut state = State {
    guild_id,
    user_id,
    gateway,
    pending: PendingHandshake::default(),
    voice: None,
    queue: Arc::new(Mutex::new(VecDeque::new())),
    skip_tx: None,
    playback_task: None,
    internal_tx
  };

  let mut keepalive_ticker = tokio::time::interval(UDP_KEEPALIVE_INTERVAL);
  keepalive_ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      command = rx.recv() => {
        match command {
          Some(command) => state.handle_command(command).await,
          None => break
        }
      }
      event = internal_rx.recv() => {
        match event {
          Some(InternalEvent::PlaybackFinished) => {
            state.skip_tx = None;
            state.playback_task = None;
          }
          None => {}
        }
      }
      _ = keepalive_ticker.tick() => {
        if let Some(voice) = &state.voice {
          if let Err(error) = voice.send_keepalive_if_due().await {
            warn!(%error, guild_id = %state.guild_id, "failed to send udp keepalive");
          }
        }
      }
    }
  }

  state.stop_playback();
  if let Some(voice) = state.voice.take() {
    voice.close(1000).await;
  }
}

impl State {
  async fn handle_command(&mut self, command: DirectorCommand) {
    match command {
      DirectorCommand::Join { channel_id } => {
        if let Err(error) = self.gateway.update_voice_state(self.guild_id, Some(channel_id), false, false).await {
          warn!(%error, guild_id = %self.guild_id, "failed to request voice channel join");
        }
      }
      DirectorCommand::Leave => {
        self.stop_playback();
        self.queue.lock().await.clear();
        if let Some(voice) = self.voice.take() {
          voice.close(1000).await;
        }
        if let Err(error) = self.gateway.update_voice_state(self.guild_id, None, false, false).await {
          warn!(%error, guild_id = %self.guild_id, "failed to request voice channel leave");
        }
      }
      DirectorCommand::Play { source } => {
        self.queue.lock().await.push_back(source);
        self.start_playback();
      }
      DirectorCommand::Skip => {
        if let Some(skip_tx) = &self.skip_tx {
          let _ = skip_tx.send(());
        } else {
          self.start_playback();
        }
      }
      DirectorCommand::VoiceSessionId { session_id } => {
        self.pending.session_id = Some(session_id);
        self.try_connect().await;
      }
      DirectorCommand::VoiceServer { token, endpoint } => {
        self.pending.server = Some((token, endpoint));
        self.try_connect().await;
      }
    }
  }

  async fn try_connect(&mut self) {
    let Some((session_id, token, endpoint)) = self.pending.take_if_complete() else { return };

    let options = VoiceConnectOptions {
      user_id: self.user_id.0,
      guild_id: self.guild_id.0,
      endpoint,
      token,
      session_id
    };
    let voice = Arc::new(VoiceGateway::new(options));

    let run_voice = voice.clone();
    tokio::spawn(async move {
      if let Err(error) = run_voice.run().await {
        warn!(%error, "voice gateway terminated");
      }
    });

    self.voice = Some(voice);
    self.start_playback();
  }

  fn start_playback(&mut self) {
    if self.playback_task.is_some() {
      return;
    }
    let Some(voice) = self.voice.clone() else { return };

    let (skip_tx, skip_rx) = mpsc::unbounded_channel();
    let queue = self.queue.clone();
    let done = self.internal_tx.clone();
    self.skip_tx = Some(skip_tx);
    self.playback_task = Some(tokio::spawn(run_playback(voice, queue, skip_rx, done)));
  }

  fn stop_playback(&mut self) {
    if let Some(task) = self.playback_task.take() {
      task.abort();
    }
    self.skip_tx = None;
  }
}

/// Pops sources off `queue` one at a time, Opus-encoding and sending 20ms
/// frames for each until it drains or `skip_rx` fires (which cuts the
/// current source short and moves on to the next).
async fn run_playback(
  voice: Arc<VoiceGateway>,
  queue: Arc<Mutex<VecDeque<String>>>,
  mut skip_rx: mpsc::UnboundedReceiver<()>,
  done: mpsc::UnboundedSender<InternalEvent>
) {
  loop {
    let source = queue.lock().await.pop_front();
    let Some(source) = source else { break };

    let boxed_source: Box<dyn AudioSource> = if source.starts_with("http://") || source.starts_with("https://") {
      match SubprocessSource::spawn(&source) {
        Ok(source) => Box::new(source),
        Err(error) => {
          warn!(%error, %source, "failed to spawn audio source subprocess");
          continue;
        }
      }
    } else {
      match FileSource::open(&source).await {
        Ok(source) => Box::new(source),
        Err(error) => {
          warn!(%error, %source, "failed to open audio file");
          continue;
        }
      }
    };

    let mut pipeline = match AudioPipeline::new(boxed_source, DEFAULT_BITRATE_BPS) {
      Ok(pipeline) => pipeline,
      Err(error) => {
        warn!(%error, %source, "failed to build audio pipeline");
        continue;
      }
    };

    if let Err(error) = voice.set_speaking(true).await {
      warn!(%error, "failed to signal speaking state");
    }

    let mut ticker = tokio::time::interval(Duration::from_millis(FRAME_DURATION_MS as u64));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
      tokio::select! {
        _ = skip_rx.recv() => break,
        _ = ticker.tick() => {
          match pipeline.next_frame().await {
            Ok(Some(frame)) => {
              if let Err(error) = voice.send_frame(&frame.bytes, frame.sample_count).await {
                warn!(%error, "failed to send voice frame");
              }
              if frame.end_of_source {
                break;
              }
            }
            Ok(None) => break,
            Err(error) => {
              warn!(%error, "audio pipeline error, skipping to next source");
              break;
            }
          }
        }
      }
    }
  }

  if let Err(error) = voice.set_speaking(false).await {
    warn!(%error, "failed to clear speaking state");
  }
  let _ = done.send(InternalEvent::PlaybackFinished);
}
