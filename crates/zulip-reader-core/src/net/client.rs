use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use super::{FetchRequest, FetchResult, MessageSource, Registration, Subscription};
use crate::error::{FeedError, Result};
use crate::models::{ApiMessage, Message, MessagePost};

const API_PREFIX: &str = "api/v1";

/// Envelope every Zulip endpoint answers with
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    result: String,
    #[serde(default)]
    msg: String,
    #[serde(flatten)]
    body: Option<T>,
}

impl<T> ApiResponse<T> {
    fn into_body(self) -> Result<T> {
        if self.result != "success" {
            return Err(FeedError::Api { msg: self.msg });
        }
        self.body.ok_or_else(|| FeedError::Api {
            msg: "response body missing".to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct MessagesBody {
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
struct RegisterBody {
    #[serde(default)]
    max_message_id: Option<u64>,
    #[serde(default)]
    subscriptions: Vec<Subscription>,
}

#[derive(Debug, Deserialize)]
struct Empty {}

/// Zulip REST client authenticated with an email / API key pair
pub struct ZulipClient {
    realm_url: String,
    email: String,
    api_key: String,
    client: reqwest::Client,
}

impl ZulipClient {
    pub fn new(realm_url: &str, email: &str, api_key: &str) -> Self {
        Self {
            realm_url: realm_url.trim_end_matches('/').to_string(),
            email: email.to_string(),
            api_key: api_key.to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn email(&self) -> &str {
        &self.email
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}/{}", self.realm_url, API_PREFIX, endpoint)
    }

    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let text = response.text().await?;
        let parsed: ApiResponse<T> = serde_json::from_str(&text)?;
        parsed.into_body()
    }
}

#[async_trait]
impl MessageSource for ZulipClient {
    async fn fetch(&self, request: FetchRequest) -> Result<FetchResult> {
        let narrow = serde_json::to_string(&request.narrow)?;
        let query = [
            ("anchor", request.anchor.as_param()),
            ("num_before", request.num_before.to_string()),
            ("num_after", request.num_after.to_string()),
            ("narrow", narrow),
            ("apply_markdown", "false".to_string()),
        ];
        debug!(
            anchor = %request.anchor.as_param(),
            before = request.num_before,
            after = request.num_after,
            home = request.is_home_scoped(),
            "GET messages"
        );

        let response = self
            .client
            .get(self.url("messages"))
            .basic_auth(&self.email, Some(&self.api_key))
            .query(&query)
            .send()
            .await?;
        let body: MessagesBody = Self::read(response).await?;

        let messages: Vec<Message> = body
            .messages
            .into_iter()
            .filter_map(|raw| Message::from_api(raw, &self.email))
            .collect();
        Ok(FetchResult::new(messages))
    }

    async fn register(&self) -> Result<Registration> {
        let params = [
            ("event_types", r#"["message","subscription"]"#),
            ("fetch_event_types", r#"["message","subscription"]"#),
        ];
        let response = self
            .client
            .post(self.url("register"))
            .basic_auth(&self.email, Some(&self.api_key))
            .form(&params)
            .send()
            .await?;
        let body: RegisterBody = Self::read(response).await?;

        Ok(Registration {
            max_message_id: body.max_message_id,
            subscriptions: body.subscriptions,
        })
    }

    async fn send_message(&self, post: &MessagePost) -> Result<()> {
        let response = self
            .client
            .post(self.url("messages"))
            .basic_auth(&self.email, Some(&self.api_key))
            .form(&post.form_params())
            .send()
            .await?;
        let _: Empty = Self::read(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_strips_trailing_slash() {
        let client = ZulipClient::new("https://chat.example.com/", "me@x", "key");
        assert_eq!(
            client.url("messages"),
            "https://chat.example.com/api/v1/messages"
        );
    }

    #[test]
    fn test_error_envelope_becomes_api_error() {
        let parsed: ApiResponse<MessagesBody> =
            serde_json::from_str(r#"{"result":"error","msg":"Invalid API key","code":"BAD"}"#)
                .unwrap();
        match parsed.into_body() {
            Err(FeedError::Api { msg }) => assert_eq!(msg, "Invalid API key"),
            other => panic!("unexpected: {:?}", other.map(|b| b.messages.len())),
        }
    }

    #[test]
    fn test_register_body_decodes() {
        let parsed: ApiResponse<RegisterBody> = serde_json::from_str(
            r##"{"result":"success","msg":"","max_message_id":120,
                "subscriptions":[{"name":"general","color":"#76ce90","stream_id":1}]}"##,
        )
        .unwrap();
        let body = parsed.into_body().unwrap();
        assert_eq!(body.max_message_id, Some(120));
        assert_eq!(body.subscriptions[0].name, "general");
    }

    #[test]
    fn test_messages_body_decodes() {
        let parsed: ApiResponse<MessagesBody> = serde_json::from_str(
            r#"{"result":"success","msg":"","messages":[{
                "id":7,"timestamp":1700000000,"sender_full_name":"Ann",
                "sender_email":"ann@x","type":"stream","display_recipient":"general",
                "subject":"lunch","content":"hi","flags":["read"]}]}"#,
        )
        .unwrap();
        let body = parsed.into_body().unwrap();
        assert_eq!(body.messages.len(), 1);
        assert_eq!(body.messages[0].id, 7);
    }

    #[tokio::test]
    #[ignore] // Requires a live Zulip realm
    async fn test_register_live() {
        let realm = std::env::var("ZULIP_REALM").expect("ZULIP_REALM not set");
        let email = std::env::var("ZULIP_EMAIL").expect("ZULIP_EMAIL not set");
        let key = std::env::var("ZULIP_API_KEY").expect("ZULIP_API_KEY not set");
        let client = ZulipClient::new(&realm, &email, &key);
        assert!(client.register().await.is_ok());
    }
}
