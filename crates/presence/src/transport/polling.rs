//! HTTP long-polling transport, used when WebSocket is unavailable.
//!
//! Session protocol against the hub:
//!
//! ```text
//! POST   /{namespace}/poll?userId=..   -> {"sid": ".."}
//! GET    /{namespace}/poll/{sid}       -> {"frames": [..]}   (long-poll)
//! POST   /{namespace}/poll/{sid}       <- one text frame
//! DELETE /{namespace}/poll/{sid}       -> session closed (on sink close)
//! 404 on any session URL               -> session gone
//! ```

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use carelink_core::protocol::{PollBatch, PollOpened};
use futures::future::BoxFuture;
use futures::{sink, stream, FutureExt, Sink, StreamExt};
use reqwest::{StatusCode, Url};

use super::{Connector, FrameSink, Transport, TransportError, TransportKind};

/// Upper bound for one long-poll request. Must exceed the hub's
/// `POLL_TIMEOUT_SECS`.
const POLL_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Timeout for opening a session and for sending a frame.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Connects to the hub over HTTP long-polling.
pub struct PollingConnector {
    client: reqwest::Client,
    url: Url,
}

impl PollingConnector {
    /// * `url` - session collection endpoint, e.g.
    ///   `http://host:3000/presence/poll?userId=u1`.
    pub fn new(url: Url) -> Self {
        Self::with_client(reqwest::Client::new(), url)
    }

    /// Create a connector reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, url: Url) -> Self {
        Self { client, url }
    }

    fn session_url(&self, sid: &str) -> Result<Url, TransportError> {
        let mut url = self.url.clone();
        url.set_query(None);
        url.path_segments_mut()
            .map_err(|()| TransportError::Connect(format!("Invalid polling URL {}", self.url)))?
            .push(sid);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl Connector for PollingConnector {
    fn kind(&self) -> TransportKind {
        TransportKind::Polling
    }

    async fn open(&self) -> Result<Transport, TransportError> {
        let response = self
            .client
            .post(self.url.clone())
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::Connect(format!("Failed to reach {}: {e}", self.url)))?;

        if !response.status().is_success() {
            return Err(TransportError::Connect(format!(
                "Hub refused polling session ({})",
                response.status()
            )));
        }

        let opened: PollOpened = response
            .json()
            .await
            .map_err(|e| TransportError::Connect(format!("Invalid polling handshake: {e}")))?;
        let session_url = self.session_url(&opened.sid)?;

        tracing::debug!(url = %session_url, "Polling transport open");

        let poller = Poller {
            client: self.client.clone(),
            url: session_url.clone(),
            buffered: VecDeque::new(),
            finished: false,
        };
        let stream = stream::unfold(poller, |mut poller| async move {
            let item = poller.next_frame().await?;
            Some((item, poller))
        });

        let frames = sink::unfold(
            (self.client.clone(), session_url.clone()),
            |(client, url), frame: String| async move {
                let response = client
                    .post(url.clone())
                    .timeout(REQUEST_TIMEOUT)
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(frame)
                    .send()
                    .await
                    .map_err(|e| TransportError::Send(e.to_string()))?;
                if !response.status().is_success() {
                    return Err(TransportError::Send(format!(
                        "Hub rejected frame ({})",
                        response.status()
                    )));
                }
                Ok((client, url))
            },
        );

        let sink = PollingSink {
            frames: Box::pin(frames),
            client: self.client.clone(),
            url: session_url,
            release: None,
            frames_closed: false,
            released: false,
        };

        Ok(Transport {
            kind: TransportKind::Polling,
            sink: Box::pin(sink),
            stream: stream.boxed(),
        })
    }
}

/// Outbound side of a polling session. Closing it flushes pending frames,
/// then deletes the session on the hub so it is not left for the reaper.
struct PollingSink {
    frames: FrameSink,
    client: reqwest::Client,
    url: Url,
    release: Option<BoxFuture<'static, ()>>,
    frames_closed: bool,
    released: bool,
}

impl Sink<String> for PollingSink {
    type Error = TransportError;

    fn poll_ready(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.frames.as_mut().poll_ready(cx)
    }

    fn start_send(mut self: Pin<&mut Self>, frame: String) -> Result<(), Self::Error> {
        self.frames.as_mut().start_send(frame)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.frames.as_mut().poll_flush(cx)
    }

    fn poll_close(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        let this = self.get_mut();
        if this.released {
            return Poll::Ready(Ok(()));
        }

        if !this.frames_closed {
            if let Err(e) = futures::ready!(this.frames.as_mut().poll_close(cx)) {
                tracing::debug!(error = %e, "Pending polling frame not delivered");
            }
            this.frames_closed = true;
        }

        let release = this.release.get_or_insert_with(|| {
            let request = this.client.delete(this.url.clone()).timeout(REQUEST_TIMEOUT);
            let url = this.url.clone();
            async move {
                match request.send().await {
                    Ok(response) => {
                        tracing::debug!(%url, status = %response.status(), "Polling session released");
                    }
                    Err(e) => {
                        tracing::debug!(%url, error = %e, "Failed to release polling session");
                    }
                }
            }
            .boxed()
        });
        futures::ready!(release.poll_unpin(cx));

        this.release = None;
        this.released = true;
        Poll::Ready(Ok(()))
    }
}

/// Inbound side of a polling session: issues long-poll requests and hands
/// out the returned frames one at a time.
struct Poller {
    client: reqwest::Client,
    url: Url,
    buffered: VecDeque<String>,
    finished: bool,
}

impl Poller {
    /// `None` once the hub reports the session gone or after an error has
    /// been yielded.
    async fn next_frame(&mut self) -> Option<Result<String, TransportError>> {
        loop {
            if let Some(frame) = self.buffered.pop_front() {
                return Some(Ok(frame));
            }
            if self.finished {
                return None;
            }
            match self.poll_once().await {
                Ok(Some(batch)) => self.buffered.extend(batch.frames),
                Ok(None) => {
                    self.finished = true;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }

    async fn poll_once(&self) -> Result<Option<PollBatch>, TransportError> {
        let response = self
            .client
            .get(self.url.clone())
            .timeout(POLL_REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| TransportError::Receive(e.to_string()))?;

        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::GONE => Ok(None),
            status if status.is_success() => {
                let batch = response
                    .json::<PollBatch>()
                    .await
                    .map_err(|e| TransportError::Receive(e.to_string()))?;
                Ok(Some(batch))
            }
            status => Err(TransportError::Receive(format!("Hub returned {status}"))),
        }
    }
}
