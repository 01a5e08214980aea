pub mod api;
pub mod sse;

use std::collections::VecDeque;

use async_trait::async_trait;
use futures::future::ready;
use futures::stream::{self, StreamExt, TryStreamExt};
use tracing::{debug, error, info, warn};

use self::api::{GenerateContentRequest, GenerateContentResponse, GenerationConfig};
use self::sse::SseDecoder;
use crate::config::AppConfig;
use crate::llm::{ChatModel, GenerationRequest, ModelError, TokenStream};

/// Google Gemini over the public REST API.
pub struct GeminiModel {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    model: String,
    generation_config: GenerationConfig,
}

impl GeminiModel {
    pub fn new(client: reqwest::Client, config: &AppConfig) -> Self {
        GeminiModel {
            client,
            api_key: config.gemini_api_key.clone(),
            base_url: config.gemini_api_base.trim_end_matches('/').to_string(),
            model: config.gemini_model.clone(),
            generation_config: GenerationConfig {
                temperature: config.temperature,
                max_output_tokens: config.max_output_tokens,
            },
        }
    }

    async fn post(
        &self,
        method: &str,
        request: &GenerationRequest,
    ) -> Result<reqwest::Response, ModelError> {
        // Checked before anything touches the network.
        let api_key = self.api_key.as_deref().ok_or(ModelError::MissingApiKey)?;

        let url = format!("{}/models/{}:{}", self.base_url, self.model, method);
        let body = GenerateContentRequest::new(request, self.generation_config.clone());
        debug!(
            model = %self.model,
            method,
            turns = body.contents.len(),
            has_attachment = request.attachment.is_some(),
            "sending generation request"
        );

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read response body".to_string());
            error!(status = status.as_u16(), body = %error_body, "model API error");
            return Err(ModelError::from_status(status.as_u16(), error_body));
        }

        Ok(response)
    }
}

#[async_trait]
impl ChatModel for GeminiModel {
    async fn stream(&self, request: &GenerationRequest) -> Result<TokenStream, ModelError> {
        let response = self.post("streamGenerateContent?alt=sse", request).await?;
        let body = response.bytes_stream().boxed();

        let payloads = stream::unfold(
            (body, SseDecoder::default(), VecDeque::new(), false),
            |(mut body, mut decoder, mut pending, mut ended)| async move {
                loop {
                    if let Some(item) = pending.pop_front() {
                        return Some((item, (body, decoder, pending, ended)));
                    }
                    if ended {
                        return None;
                    }
                    match body.next().await {
                        Some(Ok(chunk)) => pending.extend(decoder.push(&chunk).into_iter().map(Ok)),
                        Some(Err(e)) => {
                            pending.push_back(Err(ModelError::Transport(e)));
                            ended = true;
                        }
                        None => {
                            pending.extend(decoder.finish().map(Ok));
                            ended = true;
                        }
                    }
                }
            },
        );

        let tokens = payloads
            .map(|item: Result<String, ModelError>| -> Result<String, ModelError> {
                let response: GenerateContentResponse = serde_json::from_str(&item?)?;
                if let Some(reason) = response.block_reason() {
                    warn!("Prompt blocked by the model: {}", reason);
                }
                if let Some(reason) = response.finish_reason() {
                    info!("Chat completion finished with reason: {}", reason);
                }
                Ok(response.text())
            })
            .try_filter(|text: &String| ready(!text.is_empty()));

        Ok(require_text(tokens.boxed()))
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, ModelError> {
        let response = self.post("generateContent", request).await?;
        let response: GenerateContentResponse = response.json().await?;
        let text = response.text();
        if text.trim().is_empty() {
            return Err(ModelError::Empty);
        }
        Ok(text)
    }
}

/// Ends with `ModelError::Empty` when the upstream closes without any text,
/// so a blocked or empty reply never reads as a finished answer.
fn require_text(tokens: TokenStream) -> TokenStream {
    stream::unfold(
        (tokens, false, false),
        |(mut tokens, produced, ended)| async move {
            if ended {
                return None;
            }
            match tokens.next().await {
                Some(Ok(text)) => Some((Ok(text), (tokens, true, false))),
                Some(Err(e)) => Some((Err(e), (tokens, produced, true))),
                None if produced => None,
                None => Some((Err(ModelError::Empty), (tokens, produced, true))),
            }
        },
    )
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_config;
    use actix_web::{web, App, HttpRequest, HttpResponse, HttpServer};

    fn request(message: &str) -> GenerationRequest {
        GenerationRequest {
            system_prompt: Some("tutor".to_string()),
            history: vec![],
            message: message.to_string(),
            attachment: None,
        }
    }

    /// Serves canned responses in place of the Gemini API and returns its base URL.
    fn fake_upstream(status: u16, content_type: &'static str, body: &'static str) -> String {
        let server = HttpServer::new(move || {
            App::new().default_service(web::to(move |req: HttpRequest| async move {
                assert_eq!(
                    req.headers().get("x-goog-api-key").and_then(|v| v.to_str().ok()),
                    Some("test-key")
                );
                HttpResponse::build(actix_web::http::StatusCode::from_u16(status).unwrap())
                    .content_type(content_type)
                    .body(body)
            }))
        })
        .workers(1)
        .bind(("127.0.0.1", 0))
        .unwrap();
        let addr = server.addrs()[0];
        actix_web::rt::spawn(server.run());
        format!("http://{}", addr)
    }

    fn model_for(base_url: Option<String>, api_key: Option<&str>) -> GeminiModel {
        let mut config = test_config();
        config.gemini_api_key = api_key.map(str::to_string);
        if let Some(base_url) = base_url {
            config.gemini_api_base = base_url;
        }
        GeminiModel::new(reqwest::Client::new(), &config)
    }

    #[actix_web::test]
    async fn missing_api_key_fails_without_a_network_call() {
        // Unroutable base URL: reaching the network would surface a transport error instead.
        let model = model_for(Some("http://127.0.0.1:9".to_string()), None);
        assert!(matches!(
            model.stream(&request("hi")).await,
            Err(ModelError::MissingApiKey)
        ));
        assert!(matches!(
            model.generate(&request("hi")).await,
            Err(ModelError::MissingApiKey)
        ));
    }

    #[actix_web::test]
    async fn streamed_fragments_arrive_in_order() {
        let base = fake_upstream(
            200,
            "text/event-stream",
            "data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"2+2 \"}]}}]}\r\n\r\n\
             data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"is \"}]}}]}\r\n\r\n\
             data: {\"candidates\":[{\"content\":{\"role\":\"model\",\"parts\":[{\"text\":\"4.\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );
        let model = model_for(Some(base), Some("test-key"));

        let tokens: Vec<String> = model
            .stream(&request("What is 2+2?"))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(tokens, vec!["2+2 ", "is ", "4."]);
    }

    #[actix_web::test]
    async fn blocked_prompt_ends_the_stream_with_an_error() {
        let base = fake_upstream(
            200,
            "text/event-stream",
            "data: {\"promptFeedback\":{\"blockReason\":\"SAFETY\"}}\r\n\r\n",
        );
        let model = model_for(Some(base), Some("test-key"));

        let items: Vec<Result<String, ModelError>> =
            model.stream(&request("hi")).await.unwrap().collect().await;
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ModelError::Empty)));
    }

    #[actix_web::test]
    async fn empty_parts_are_not_a_reply() {
        let base = fake_upstream(
            200,
            "text/event-stream",
            "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n",
        );
        let model = model_for(Some(base), Some("test-key"));

        let tokens = model.stream(&request("hi")).await.unwrap();
        let frames: Vec<_> = crate::relay::sse_frames(tokens, None).collect().await;
        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_err());
    }

    #[actix_web::test]
    async fn error_statuses_are_classified_before_streaming() {
        let model = model_for(Some(fake_upstream(429, "application/json", "{}")), Some("test-key"));
        assert!(matches!(model.stream(&request("hi")).await, Err(ModelError::RateLimited)));

        let model = model_for(Some(fake_upstream(402, "application/json", "{}")), Some("test-key"));
        assert!(matches!(model.stream(&request("hi")).await, Err(ModelError::QuotaExhausted)));

        let model = model_for(
            Some(fake_upstream(500, "application/json", "{\"error\":\"boom\"}")),
            Some("test-key"),
        );
        match model.stream(&request("hi")).await {
            Err(ModelError::Upstream { status, body }) => {
                assert_eq!(status, 500);
                assert!(body.contains("boom"));
            }
            _ => panic!("expected an upstream error"),
        }
    }

    #[actix_web::test]
    async fn generate_returns_the_full_text() {
        let base = fake_upstream(
            200,
            "application/json",
            "{\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"hello there\"}]}}]}",
        );
        let model = model_for(Some(base), Some("test-key"));
        assert_eq!(model.generate(&request("hi")).await.unwrap(), "hello there");
    }
}
