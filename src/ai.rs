use std::path::Path;

use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
    ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestUserMessageArgs,
    ChatCompletionRequestUserMessageContent, ChatCompletionRequestUserMessageContentPart,
    CreateChatCompletionRequestArgs, ImageUrlArgs,
};
use async_openai::Client;
use base64::Engine;

use crate::error::OcrError;
use crate::ocr::Ocr;

const REQUEST_TIMEOUT_SECS: u64 = 300;

/// Reads screenshot text with an OpenAI vision model. Uses `OPENAI_API_KEY`.
pub(crate) struct VisionOcr {
    client: Client<OpenAIConfig>,
    model: String,
    prompt: String,
}

impl VisionOcr {
    pub(crate) fn new(model: &str, prompt: &str) -> Self {
        Self {
            client: Client::new(),
            model: model.to_owned(),
            prompt: prompt.to_owned(),
        }
    }
}

impl Ocr for VisionOcr {
    async fn recognize(&self, image: &Path) -> Result<String, OcrError> {
        let image_url = image_data_url(image).await?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(4096_u32)
            .messages([ChatCompletionRequestMessage::User(
                ChatCompletionRequestUserMessageArgs::default()
                    .content(ChatCompletionRequestUserMessageContent::Array(vec![
                        ChatCompletionRequestUserMessageContentPart::Text(
                            ChatCompletionRequestMessageContentPartTextArgs::default()
                                .text(&self.prompt)
                                .build()?,
                        ),
                        ChatCompletionRequestUserMessageContentPart::ImageUrl(
                            ChatCompletionRequestMessageContentPartImageArgs::default()
                                .image_url(ImageUrlArgs::default().url(image_url).build()?)
                                .build()?,
                        ),
                    ]))
                    .build()?,
            )])
            .build()?;

        let response = tokio::time::timeout(
            tokio::time::Duration::from_secs(REQUEST_TIMEOUT_SECS),
            self.client.chat().create(request),
        )
        .await??;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or(OcrError::EmptyResponse)
    }
}

async fn image_data_url(path: &Path) -> Result<String, OcrError> {
    use base64::prelude::BASE64_STANDARD;

    if !path.is_file() {
        return Err(OcrError::MissingImage(path.to_path_buf()));
    }
    let bytes = tokio::fs::read(path).await?;
    let mime = image::guess_format(&bytes)
        .or_else(|_| image::ImageFormat::from_path(path))
        .map(|format| format.to_mime_type())
        .unwrap_or("image/png");
    let data = BASE64_STANDARD.encode(bytes);
    Ok(format!("data:{};base64,{}", mime, data))
}
