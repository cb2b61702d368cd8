use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::debug;

use flap_core::{Grid, SendError, Transport};

use crate::codec::{self, BoardModel};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Read/Write API client for the board.
///
/// Both GET and POST authenticate with the `X-Vestaboard-Read-Write-Key`
/// header. A write body is the raw JSON array-of-arrays of character codes
/// with no wrapper key. HTTP 423 means the board refused the write (quiet
/// hours or rate limiting).
pub struct BoardClient {
    http: Client,
    base_url: String,
    key: String,
    model: BoardModel,
}

/// Snapshot of what the board currently shows.
#[derive(Debug)]
pub struct BoardState {
    pub id: String,
    pub layout: Vec<Vec<u8>>,
}

impl BoardState {
    /// Decode the layout into text lines for logging.
    pub fn text_lines(&self, model: BoardModel) -> Vec<String> {
        self.layout
            .iter()
            .map(|row| codec::row_text(row, model))
            .collect()
    }
}

#[derive(Deserialize)]
struct StateResponse {
    #[serde(rename = "currentMessage")]
    current_message: Option<CurrentMessage>,
}

#[derive(Deserialize)]
struct CurrentMessage {
    id: String,
    /// The layout arrives as a JSON-encoded string, not a nested array.
    layout: String,
}

impl BoardClient {
    pub fn new(base_url: String, key: String, model: BoardModel) -> Self {
        let http = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .expect("failed to build HTTP client");
        Self {
            http,
            base_url,
            key,
            model,
        }
    }

    pub fn model(&self) -> BoardModel {
        self.model
    }

    fn map_reqwest(e: reqwest::Error) -> SendError {
        if e.is_timeout() {
            SendError::Timeout {
                timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
            }
        } else {
            SendError::Connection(e.to_string())
        }
    }

    fn check_status(resp: &reqwest::Response) -> Result<(), SendError> {
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::LOCKED => {
                let retry_after_s = resp
                    .headers()
                    .get("Retry-After")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok());
                Err(SendError::Locked { retry_after_s })
            }
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(SendError::Auth("read/write key rejected".into()))
            }
            s => Err(SendError::Unexpected(format!("HTTP {s}"))),
        }
    }

    /// Fetch the current board layout, or None for a board that has never
    /// shown a message.
    pub async fn read_state(&self) -> Result<Option<BoardState>, SendError> {
        debug!(url = %self.base_url, "reading board state");
        let resp = self
            .http
            .get(&self.base_url)
            .header("X-Vestaboard-Read-Write-Key", &self.key)
            .send()
            .await
            .map_err(Self::map_reqwest)?;
        Self::check_status(&resp)?;

        let state: StateResponse = resp
            .json()
            .await
            .map_err(|e| SendError::Unexpected(format!("bad state payload: {e}")))?;
        let Some(current) = state.current_message else {
            return Ok(None);
        };
        let layout: Vec<Vec<u8>> = serde_json::from_str(&current.layout)
            .map_err(|e| SendError::Unexpected(format!("bad layout string: {e}")))?;
        Ok(Some(BoardState {
            id: current.id,
            layout,
        }))
    }
}

#[async_trait]
impl Transport for BoardClient {
    async fn send(&self, grid: &Grid) -> Result<(), SendError> {
        debug!(url = %self.base_url, rows = grid.rows(), "writing board state");
        let resp = self
            .http
            .post(&self.base_url)
            .header("X-Vestaboard-Read-Write-Key", &self.key)
            .header("Content-Type", "application/json")
            .json(grid)
            .send()
            .await
            .map_err(Self::map_reqwest)?;
        Self::check_status(&resp)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (MockServer, BoardClient) {
        let server = MockServer::start().await;
        let client = BoardClient::new(server.uri(), "test-key".to_string(), BoardModel::Note);
        (server, client)
    }

    fn grid() -> Grid {
        Grid {
            codes: vec![vec![8, 9, 0], vec![0; 3], vec![0; 3]],
        }
    }

    #[tokio::test]
    async fn test_send_posts_raw_grid() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .and(path("/"))
            .and(header("X-Vestaboard-Read-Write-Key", "test-key"))
            .and(body_json(serde_json::json!([[8, 9, 0], [0, 0, 0], [0, 0, 0]])))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        assert!(client.send(&grid()).await.is_ok());
    }

    #[tokio::test]
    async fn test_send_locked() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(423).insert_header("Retry-After", "60"))
            .mount(&server)
            .await;

        match client.send(&grid()).await {
            Err(SendError::Locked { retry_after_s }) => assert_eq!(retry_after_s, Some(60)),
            other => panic!("expected Locked, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_send_bad_key() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        assert!(matches!(client.send(&grid()).await, Err(SendError::Auth(_))));
    }

    #[tokio::test]
    async fn test_send_server_error() {
        let (server, client) = setup().await;

        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        assert!(matches!(
            client.send(&grid()).await,
            Err(SendError::Unexpected(_))
        ));
    }

    #[tokio::test]
    async fn test_read_state_decodes_layout_string() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .and(path("/"))
            .and(header("X-Vestaboard-Read-Write-Key", "test-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "currentMessage": {
                    "id": "msg-1",
                    "appeared": "2026-08-30T10:00:00Z",
                    "layout": "[[8,9],[0,0]]"
                }
            })))
            .mount(&server)
            .await;

        let state = client.read_state().await.unwrap().unwrap();
        assert_eq!(state.id, "msg-1");
        assert_eq!(state.layout, vec![vec![8, 9], vec![0, 0]]);
        assert_eq!(state.text_lines(BoardModel::Note)[0], "HI");
    }

    #[tokio::test]
    async fn test_read_state_empty_board() {
        let (server, client) = setup().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
            .mount(&server)
            .await;

        assert!(client.read_state().await.unwrap().is_none());
    }
}
