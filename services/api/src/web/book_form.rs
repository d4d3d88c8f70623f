//! services/api/src/web/book_form.rs
//!
//! The request schema shared by "create book" and "update book". Both routes
//! accept either a JSON body or `multipart/form-data` with the same field
//! names; multipart requests may also carry `coverImage` and `images` files.
//! Parsing happens once here and produces a typed core command.

use axum::{
    extract::{FromRequest, Multipart, Request},
    http::header::CONTENT_TYPE,
};
use bookshelf_core::domain::{BookChanges, BookDraft, Layout, NewContentBlock};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::Value;
use tracing::warn;
use utoipa::ToSchema;

use crate::error::ApiError;
use crate::web::extract::{non_blank, value_as_i64, JsonBody};

//=========================================================================================
// Request Schema
//=========================================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ContentBlockPayload {
    #[serde(rename = "type")]
    pub block_type: String,
    #[serde(default)]
    pub content: String,
    pub order: i32,
}

/// The fields of a catalog write, before validation.
#[derive(Debug, Default, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct BookPayload {
    pub title: Option<String>,
    pub author: Option<String>,
    pub language: Option<String>,
    pub cover_image: Option<String>,
    pub small_description: Option<String>,
    pub content: Option<String>,
    /// A number or a numeric string.
    #[schema(value_type = Option<i32>)]
    pub page_count: Option<Value>,
    pub audio_link: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub related_info: Option<Value>,
    /// One of `FULL_TEXT`, `IMAGE_TOP_TEXT_BOTTOM`, `TEXT_TOP_IMAGE_BOTTOM`, `MIXED`.
    pub layout: Option<String>,
    pub images: Option<Vec<String>>,
    #[serde(default)]
    pub category_names: Vec<String>,
    #[serde(default)]
    pub content_blocks: Vec<ContentBlockPayload>,
}

/// A non-empty uploaded file.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub data: Bytes,
}

/// A parsed catalog write: the payload plus any uploaded files.
#[derive(Debug, Default)]
pub struct BookForm {
    pub payload: BookPayload,
    pub cover_upload: Option<UploadedFile>,
    pub image_uploads: Vec<UploadedFile>,
}

//=========================================================================================
// Validation
//=========================================================================================

fn parse_page_count(value: Option<Value>) -> Result<Option<i32>, ApiError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(v) => value_as_i64(&v)
            .and_then(|n| i32::try_from(n).ok())
            .filter(|n| *n >= 0)
            .map(Some)
            .ok_or_else(|| ApiError::BadRequest("pageCount must be a non-negative integer".to_string())),
    }
}

fn parse_layout(value: Option<String>) -> Result<Option<Layout>, ApiError> {
    non_blank(value)
        .map(|raw| raw.parse::<Layout>())
        .transpose()
        .map_err(|e| ApiError::BadRequest(format!("Invalid layout: {}", e.0)))
}

/// Rejects a required field that was supplied but blank.
fn required_if_present(value: Option<String>, field: &str) -> Result<Option<String>, ApiError> {
    match value {
        Some(v) if v.trim().is_empty() => {
            Err(ApiError::BadRequest(format!("{} must not be empty", field)))
        }
        Some(v) => Ok(Some(v.trim().to_string())),
        None => Ok(None),
    }
}

fn into_blocks(blocks: Vec<ContentBlockPayload>) -> Vec<NewContentBlock> {
    blocks
        .into_iter()
        .map(|b| NewContentBlock {
            block_type: b.block_type,
            content: b.content,
            order: b.order,
        })
        .collect()
}

impl BookPayload {
    /// Validates a "create book" request. Title, author and language are required.
    pub fn into_draft(self) -> Result<BookDraft, ApiError> {
        let (Some(title), Some(author), Some(language)) = (
            non_blank(self.title),
            non_blank(self.author),
            non_blank(self.language),
        ) else {
            return Err(ApiError::BadRequest(
                "Missing required fields: title, author, or language".to_string(),
            ));
        };

        Ok(BookDraft {
            title,
            author,
            language,
            cover_image: non_blank(self.cover_image),
            small_description: non_blank(self.small_description),
            content: self.content.filter(|c| !c.trim().is_empty()),
            page_count: parse_page_count(self.page_count)?,
            audio_link: non_blank(self.audio_link),
            related_info: self.related_info.filter(|v| !v.is_null()),
            layout: parse_layout(self.layout)?.unwrap_or_default(),
            images: self.images.unwrap_or_default(),
            category_names: self.category_names,
            content_blocks: into_blocks(self.content_blocks),
        })
    }

    /// Validates an "update book" request. Absent scalars stay unchanged;
    /// categories and content blocks are replaced with the given lists.
    pub fn into_changes(self) -> Result<BookChanges, ApiError> {
        Ok(BookChanges {
            title: required_if_present(self.title, "title")?,
            author: required_if_present(self.author, "author")?,
            language: required_if_present(self.language, "language")?,
            cover_image: non_blank(self.cover_image),
            small_description: non_blank(self.small_description),
            content: self.content.filter(|c| !c.trim().is_empty()),
            page_count: parse_page_count(self.page_count)?,
            audio_link: non_blank(self.audio_link),
            related_info: self.related_info.filter(|v| !v.is_null()),
            layout: parse_layout(self.layout)?,
            images: self.images,
            category_names: self.category_names,
            content_blocks: into_blocks(self.content_blocks),
        })
    }
}

//=========================================================================================
// Content Negotiation
//=========================================================================================

fn bad_multipart(e: impl std::fmt::Display) -> ApiError {
    ApiError::BadRequest(format!("Failed to read multipart data: {}", e))
}

/// Accepts a JSON array of strings or a comma-separated list.
fn parse_string_list(text: &str, field: &str) -> Result<Vec<String>, ApiError> {
    let trimmed = text.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str(trimmed)
            .map_err(|e| ApiError::BadRequest(format!("Invalid {} JSON: {}", field, e)));
    }
    Ok(trimmed
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect())
}

async fn parse_multipart(mut multipart: Multipart) -> Result<BookForm, ApiError> {
    let mut form = BookForm::default();

    while let Some(field) = multipart.next_field().await.map_err(bad_multipart)? {
        let name = field.name().unwrap_or_default().to_string();

        // --- File parts ---
        if let Some(file_name) = field.file_name().map(str::to_string) {
            let data = field.bytes().await.map_err(bad_multipart)?;
            if data.is_empty() {
                // A zero-size file means "no file chosen".
                continue;
            }
            let upload = UploadedFile { file_name, data };
            match name.as_str() {
                "coverImage" => form.cover_upload = Some(upload),
                "images" => form.image_uploads.push(upload),
                other => warn!("Ignoring unexpected file field '{}'", other),
            }
            continue;
        }

        // --- Text parts ---
        let text = field.text().await.map_err(bad_multipart)?;
        let payload = &mut form.payload;
        match name.as_str() {
            "title" => payload.title = Some(text),
            "author" => payload.author = Some(text),
            "language" => payload.language = Some(text),
            "coverImage" => payload.cover_image = Some(text),
            "smallDescription" => payload.small_description = Some(text),
            "content" => payload.content = Some(text),
            "pageCount" => payload.page_count = Some(Value::String(text)),
            "audioLink" => payload.audio_link = Some(text),
            "relatedInfo" => {
                let value =
                    serde_json::from_str::<Value>(&text).unwrap_or_else(|_| Value::String(text));
                payload.related_info = Some(value);
            }
            "layout" => payload.layout = Some(text),
            "images" => payload.images = Some(parse_string_list(&text, "images")?),
            "categoryNames" => payload
                .category_names
                .extend(parse_string_list(&text, "categoryNames")?),
            "contentBlocks" => {
                payload.content_blocks = serde_json::from_str(&text).map_err(|e| {
                    ApiError::BadRequest(format!("Invalid contentBlocks JSON: {}", e))
                })?
            }
            other => warn!("Ignoring unexpected form field '{}'", other),
        }
    }

    Ok(form)
}

impl<S> FromRequest<S> for BookForm
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|ct| ct.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if is_multipart {
            let multipart = Multipart::from_request(req, state)
                .await
                .map_err(|rejection| bad_multipart(rejection.body_text()))?;
            parse_multipart(multipart).await
        } else {
            let JsonBody(payload) = JsonBody::<BookPayload>::from_request(req, state).await?;
            Ok(BookForm {
                payload,
                ..Default::default()
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn payload(value: Value) -> BookPayload {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn create_requires_title_author_language() {
        let err = payload(json!({"title": "A", "author": "  "}))
            .into_draft()
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let draft = payload(json!({"title": "A", "author": "B", "language": "EN"}))
            .into_draft()
            .unwrap();
        assert_eq!(draft.title, "A");
        assert_eq!(draft.layout, Layout::Mixed);
        assert!(draft.content_blocks.is_empty());
        assert!(draft.category_names.is_empty());
    }

    #[test]
    fn create_parses_nested_lists_and_lenient_numbers() {
        let draft = payload(json!({
            "title": "A", "author": "B", "language": "EN",
            "pageCount": "120",
            "layout": "FULL_TEXT",
            "categoryNames": ["Fiction", "NewCat"],
            "contentBlocks": [
                {"type": "text", "content": "hello", "order": 2},
                {"type": "text", "content": "again", "order": 2}
            ],
            "relatedInfo": {"isbn": "123"}
        }))
        .into_draft()
        .unwrap();

        assert_eq!(draft.page_count, Some(120));
        assert_eq!(draft.layout, Layout::FullText);
        assert_eq!(draft.category_names, vec!["Fiction", "NewCat"]);
        // Duplicate orders are kept verbatim.
        let orders: Vec<i32> = draft.content_blocks.iter().map(|b| b.order).collect();
        assert_eq!(orders, vec![2, 2]);
        assert_eq!(draft.related_info, Some(json!({"isbn": "123"})));
    }

    #[test]
    fn invalid_layout_and_page_count_are_rejected() {
        let err = payload(json!({"title": "A", "author": "B", "language": "EN", "layout": "GRID"}))
            .into_draft()
            .unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));

        let err = payload(json!({"pageCount": "many"})).into_changes().unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
    }

    #[test]
    fn update_keeps_absent_fields_and_rejects_blank_required_ones() {
        let changes = payload(json!({"author": "New Author"})).into_changes().unwrap();
        assert_eq!(changes.author.as_deref(), Some("New Author"));
        assert!(changes.title.is_none());
        assert!(changes.images.is_none());

        let err = payload(json!({"title": ""})).into_changes().unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(msg) if msg == "title must not be empty"));
    }

    #[test]
    fn string_lists_accept_json_or_commas() {
        assert_eq!(
            parse_string_list(r#"["a", "b"]"#, "images").unwrap(),
            vec!["a", "b"]
        );
        assert_eq!(
            parse_string_list("Fiction, NewCat,", "categoryNames").unwrap(),
            vec!["Fiction", "NewCat"]
        );
        assert!(parse_string_list("[oops", "images").is_err());
    }
}
