use serde::{Deserialize, Serialize};

pub const REQUEST_METHOD: &str = "POST";
pub const RESPONSES_ENDPOINT: &str = "/v1/responses";
const USER_ROLE: &str = "user";

/// One line of a batch input file: a single captioning request for one image.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestRecord {
    pub custom_id: String,
    pub method: String,
    pub url: String,
    pub body: RequestBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestBody {
    pub model: String,
    pub input: Vec<InputMessage>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InputMessage {
    pub role: String,
    pub content: Vec<ContentPart>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText { text: String },
    InputImage { image_url: String },
}

impl RequestRecord {
    /// Build a record asking `model` to answer `prompt` about a base64 JPEG.
    pub fn caption_request(custom_id: &str, model: &str, prompt: &str, jpeg_base64: &str) -> Self {
        Self {
            custom_id: custom_id.to_string(),
            method: REQUEST_METHOD.to_string(),
            url: RESPONSES_ENDPOINT.to_string(),
            body: RequestBody {
                model: model.to_string(),
                input: vec![InputMessage {
                    role: USER_ROLE.to_string(),
                    content: vec![
                        ContentPart::InputText {
                            text: prompt.to_string(),
                        },
                        ContentPart::InputImage {
                            image_url: format!("data:image/jpeg;base64,{}", jpeg_base64),
                        },
                    ],
                }],
            },
        }
    }

    /// The base64 payload of the image part, without the data URI prefix.
    pub fn image_base64(&self) -> Option<&str> {
        self.body
            .input
            .iter()
            .flat_map(|m| m.content.iter())
            .find_map(|part| match part {
                ContentPart::InputImage { image_url } => {
                    image_url.strip_prefix("data:image/jpeg;base64,")
                }
                _ => None,
            })
    }
}
