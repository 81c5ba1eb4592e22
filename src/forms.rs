use std::collections::BTreeMap;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::store::KvStore;
use crate::repository::Repository;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const EMPTY_FILE: &str = "The submitted file is empty.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

/// Field name to messages, serialized as the form's `errors` object.
#[derive(Serialize, Default, Debug, Clone, PartialEq)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: &str, message: &str) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.0.get(field).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Request bodies are JSON objects; anything else reads as an empty form.
pub fn decode_form<T: DeserializeOwned + Default>(body: &[u8]) -> T {
    if body.is_empty() {
        return T::default();
    }
    serde_json::from_slice(body).unwrap_or_default()
}

#[derive(Deserialize, Default, Debug)]
pub struct PostFormData {
    pub text: Option<String>,
    pub group: Option<String>,
    /// Base64 image payload, optionally as a `data:` URL.
    pub image: Option<String>,
    #[serde(default)]
    pub image_clear: bool,
}

#[derive(Debug, PartialEq)]
pub struct ValidImage {
    pub bytes: Vec<u8>,
    pub extension: &'static str,
}

#[derive(Debug, PartialEq)]
pub enum ImageChange {
    Keep,
    Clear,
    Replace(ValidImage),
}

#[derive(Debug)]
pub struct CleanPost {
    pub text: String,
    pub group: Option<String>,
    pub image: ImageChange,
}

/// What the client sees of a bound form: the submitted values and errors.
#[derive(Serialize, Debug, Default)]
pub struct FormState {
    pub text: String,
    pub group: Option<String>,
    pub errors: FormErrors,
}

impl FormState {
    pub fn bound(data: &PostFormData, errors: FormErrors) -> Self {
        Self {
            text: data.text.clone().unwrap_or_default(),
            group: data.group.clone().filter(|g| !g.trim().is_empty()),
            errors,
        }
    }
}

pub fn validate_post<S: KvStore>(
    repo: &Repository<'_, S>,
    data: &PostFormData,
) -> anyhow::Result<Result<CleanPost, FormErrors>> {
    let mut errors = FormErrors::default();

    let text = data.text.as_deref().unwrap_or("").trim();
    if text.is_empty() {
        errors.add("text", REQUIRED);
    }

    let group = match data.group.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(slug) => match repo.group(slug)? {
            Some(group) => Some(group.slug),
            None => {
                errors.add("group", INVALID_CHOICE);
                None
            }
        },
    };

    let image = match data.image.as_deref() {
        Some(encoded) => match validate_image(encoded) {
            Ok(image) => ImageChange::Replace(image),
            Err(message) => {
                errors.add("image", message);
                ImageChange::Keep
            }
        },
        None if data.image_clear => ImageChange::Clear,
        None => ImageChange::Keep,
    };

    if !errors.is_empty() {
        return Ok(Err(errors));
    }

    Ok(Ok(CleanPost {
        text: text.to_string(),
        group,
        image,
    }))
}

pub fn validate_image(encoded: &str) -> Result<ValidImage, &'static str> {
    let payload = match encoded.trim() {
        data_url if data_url.starts_with("data:") => data_url
            .split_once(',')
            .map(|(_, rest)| rest)
            .unwrap_or(""),
        raw => raw,
    };
    if payload.is_empty() {
        return Err(EMPTY_FILE);
    }

    let bytes = STANDARD.decode(payload).map_err(|_| INVALID_IMAGE)?;
    if bytes.is_empty() {
        return Err(EMPTY_FILE);
    }

    let format = image::guess_format(&bytes).map_err(|_| INVALID_IMAGE)?;
    image::load_from_memory_with_format(&bytes, format).map_err(|_| INVALID_IMAGE)?;

    let extension = format.extensions_str().first().copied().unwrap_or("img");
    Ok(ValidImage { bytes, extension })
}

#[derive(Deserialize, Default, Debug)]
pub struct CommentFormData {
    pub text: Option<String>,
}

pub fn validate_comment(data: &CommentFormData) -> Result<String, FormErrors> {
    let text = data.text.as_deref().unwrap_or("").trim();
    if text.is_empty() {
        let mut errors = FormErrors::default();
        errors.add("text", REQUIRED);
        return Err(errors);
    }
    Ok(text.to_string())
}
