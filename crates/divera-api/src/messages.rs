// Messenger and news endpoints.

use serde::Serialize;
use serde_json::Value;

use crate::client::DiveraClient;
use crate::error::Error;
use crate::models::{Message, MessageBody, NewsBody};

impl DiveraClient {
    /// Post a text into a message channel (`POST messages`).
    pub async fn send_message(&self, message_channel_id: u64, text: &str) -> Result<Value, Error> {
        let url = self.api_url("messages")?;
        let body = MessageBody {
            message: Message {
                message_channel_id,
                text,
            },
        };
        self.post(url, &body).await
    }

    /// Publish a news item (`POST news`).
    pub async fn create_news(&self, news: &(impl Serialize + Sync)) -> Result<Value, Error> {
        let url = self.api_url("news")?;
        self.post(url, &NewsBody { news }).await
    }
}
