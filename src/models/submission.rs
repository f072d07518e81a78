//! Submission and listing item structures.
//!
//! Submissions keep their source JSON byte-for-byte in `raw`; the typed
//! fields are extracted once here, at the API boundary, and never
//! recomputed from stored state.

use serde::Deserialize;
use serde_json::value::RawValue;

use crate::error::Result;

/// Typed fields pulled out of a submission payload at ingestion.
#[derive(Debug, Clone, Deserialize)]
struct SubmissionFields {
    id: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    permalink: String,
    #[serde(default)]
    ups: i64,
    #[serde(default)]
    created_utc: f64,
    #[serde(default)]
    link_flair_text: Option<String>,
}

/// An archived submission record.
#[derive(Debug, Clone)]
pub struct Submission {
    pub id: String,
    pub title: String,
    pub permalink: String,
    pub upvotes: i64,
    pub created_utc: i64,
    /// Flair label; empty string when the submission carries none.
    pub flair: String,
    raw: Box<RawValue>,
}

impl Submission {
    /// Extract a submission from its raw payload, keeping the payload.
    pub fn from_raw(raw: Box<RawValue>) -> Result<Self> {
        let fields: SubmissionFields = serde_json::from_str(raw.get())?;
        Ok(Self {
            id: fields.id,
            title: fields.title,
            permalink: fields.permalink,
            upvotes: fields.ups,
            created_utc: fields.created_utc as i64,
            flair: fields.link_flair_text.unwrap_or_default(),
            raw,
        })
    }

    /// The source JSON, exactly as received.
    pub fn raw_json(&self) -> &str {
        self.raw.get()
    }

    /// The markdown display string stored in the link index.
    pub fn display_string(&self) -> String {
        format!("[{}]({})", self.title, self.permalink)
    }
}

/// One child of a listing response before kind dispatch.
#[derive(Debug, Deserialize)]
pub struct ListingChild {
    pub kind: String,
    pub data: Box<RawValue>,
}

/// A comment or private message from the inbox listing.
#[derive(Debug, Clone, Deserialize)]
pub struct InboxItem {
    #[serde(default)]
    pub id: String,
    /// Fullname (`t1_...`/`t4_...`) used when replying and marking read.
    #[serde(rename = "name", default)]
    pub full_id: String,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub author: String,
}

/// A listing item, decoded once by its `kind` tag.
#[derive(Debug, Clone)]
pub enum ListingItem {
    /// `t1`
    Comment(InboxItem),
    /// `t3`
    Submission(Submission),
    /// `t4`
    Message(InboxItem),
    /// Anything else; carried so callers can log what they skipped.
    Other { kind: String },
}

impl ListingItem {
    /// Decode a listing child by its kind tag.
    pub fn from_child(child: ListingChild) -> Result<Self> {
        match child.kind.as_str() {
            "t1" => Ok(Self::Comment(serde_json::from_str(child.data.get())?)),
            "t3" => Ok(Self::Submission(Submission::from_raw(child.data)?)),
            "t4" => Ok(Self::Message(serde_json::from_str(child.data.get())?)),
            _ => Ok(Self::Other { kind: child.kind }),
        }
    }
}

/// A decoded page of the listing API.
#[derive(Debug)]
pub struct ListingPage {
    pub items: Vec<ListingItem>,
    /// Cursor toward the listing's head, when the server offers one.
    pub before: Option<String>,
    /// Cursor toward the listing's tail, when the server offers one.
    pub after: Option<String>,
}

impl ListingPage {
    /// The page's submissions, in delivered order.
    pub fn submissions(self) -> Vec<Submission> {
        self.items
            .into_iter()
            .filter_map(|item| match item {
                ListingItem::Submission(submission) => Some(submission),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAYLOAD: &str = r#"{"id":"abc123","title":"Weekly megathread","permalink":"/r/test/comments/abc123/","ups":42,"created_utc":1600000000.0,"link_flair_text":"Discussion","media":null}"#;

    fn submission_from(json: &str) -> Submission {
        let raw: Box<RawValue> = serde_json::from_str(json).unwrap();
        Submission::from_raw(raw).unwrap()
    }

    #[test]
    fn extracts_fields_once() {
        let submission = submission_from(PAYLOAD);
        assert_eq!(submission.id, "abc123");
        assert_eq!(submission.upvotes, 42);
        assert_eq!(submission.created_utc, 1_600_000_000);
        assert_eq!(submission.flair, "Discussion");
    }

    #[test]
    fn preserves_raw_payload_bytes() {
        let submission = submission_from(PAYLOAD);
        assert_eq!(submission.raw_json(), PAYLOAD);
    }

    #[test]
    fn missing_flair_is_empty_string() {
        let submission = submission_from(r#"{"id":"x","created_utc":1.0}"#);
        assert_eq!(submission.flair, "");
    }

    #[test]
    fn display_string_is_title_link_markdown() {
        let submission = submission_from(PAYLOAD);
        assert_eq!(
            submission.display_string(),
            "[Weekly megathread](/r/test/comments/abc123/)"
        );
    }

    #[test]
    fn dispatches_children_by_kind() {
        let child: ListingChild =
            serde_json::from_str(&format!(r#"{{"kind":"t3","data":{PAYLOAD}}}"#)).unwrap();
        assert!(matches!(
            ListingItem::from_child(child).unwrap(),
            ListingItem::Submission(_)
        ));

        let child: ListingChild = serde_json::from_str(
            r#"{"kind":"t1","data":{"id":"c1","name":"t1_c1","body":"hi","author":"someone"}}"#,
        )
        .unwrap();
        match ListingItem::from_child(child).unwrap() {
            ListingItem::Comment(comment) => {
                assert_eq!(comment.full_id, "t1_c1");
                assert_eq!(comment.body, "hi");
            }
            other => panic!("expected comment, got {other:?}"),
        }

        let child: ListingChild =
            serde_json::from_str(r#"{"kind":"t5","data":{"id":"s"}}"#).unwrap();
        assert!(matches!(
            ListingItem::from_child(child).unwrap(),
            ListingItem::Other { .. }
        ));
    }
}
