use serde::Deserialize;

/// Upper bound on images fetched from a single rich-text message.
pub const MAX_RICHTEXT_IMAGES: usize = 10;

/// Token standing in for a fetched image in flattened text.
pub const RICHTEXT_IMAGE_PLACEHOLDER: &str = "<media:image>";

/// Literal used for images that will not be fetched.
pub const RICHTEXT_IMAGE_FALLBACK: &str = "[图片]";

/// One node of `content.richText[]`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RichTextNode {
    pub text: Option<String>,
    #[serde(rename = "type")]
    pub node_type: Option<String>,
    pub download_code: Option<String>,
    pub picture_download_code: Option<String>,
}

impl RichTextNode {
    fn download_code(&self) -> Option<&str> {
        self.download_code
            .as_deref()
            .or(self.picture_download_code.as_deref())
            .filter(|code| !code.is_empty())
    }
}

/// A picture to fetch, correlated back to the text by its placeholder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaFetchTask {
    pub download_code: String,
    pub placeholder: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FlattenedRichText {
    pub text: String,
    pub media_tasks: Vec<MediaFetchTask>,
}

/// Concatenate rich-text nodes in order. Text is copied verbatim, pictures
/// become a placeholder plus a fetch task (up to [`MAX_RICHTEXT_IMAGES`]) or
/// the fallback literal, anything else is dropped.
pub fn flatten(nodes: &[RichTextNode]) -> FlattenedRichText {
    let mut out = FlattenedRichText::default();

    for node in nodes {
        if let Some(text) = node.text.as_deref() {
            out.text.push_str(text);
            continue;
        }
        if node.node_type.as_deref() != Some("picture") {
            continue;
        }

        match node.download_code() {
            Some(code) if out.media_tasks.len() < MAX_RICHTEXT_IMAGES => {
                out.text.push_str(RICHTEXT_IMAGE_PLACEHOLDER);
                out.media_tasks.push(MediaFetchTask {
                    download_code: code.to_string(),
                    placeholder: RICHTEXT_IMAGE_PLACEHOLDER.to_string(),
                });
            },
            _ => out.text.push_str(RICHTEXT_IMAGE_FALLBACK),
        }
    }

    out
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(value: serde_json::Value) -> Vec<RichTextNode> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn empty_input() {
        assert_eq!(flatten(&[]), FlattenedRichText::default());
    }

    #[test]
    fn text_and_picture_keep_order() {
        let flat = flatten(&nodes(serde_json::json!([
            { "text": "a" },
            { "type": "picture", "downloadCode": "x" },
            { "text": "b" },
        ])));

        assert_eq!(flat.text, format!("a{RICHTEXT_IMAGE_PLACEHOLDER}b"));
        assert_eq!(flat.media_tasks, vec![MediaFetchTask {
            download_code: "x".into(),
            placeholder: RICHTEXT_IMAGE_PLACEHOLDER.into(),
        }]);
    }

    #[test]
    fn picture_download_code_is_fallback_field() {
        let flat = flatten(&nodes(serde_json::json!([
            { "type": "picture", "pictureDownloadCode": "pic-1" },
        ])));
        assert_eq!(flat.media_tasks[0].download_code, "pic-1");
    }

    #[test]
    fn caps_fetch_tasks_at_ten() {
        let pictures: Vec<_> = (0..12)
            .map(|i| serde_json::json!({ "type": "picture", "downloadCode": format!("code-{i}") }))
            .collect();
        let flat = flatten(&nodes(serde_json::Value::Array(pictures)));

        assert_eq!(flat.media_tasks.len(), MAX_RICHTEXT_IMAGES);
        assert_eq!(flat.media_tasks[9].download_code, "code-9");
        assert_eq!(flat.text.matches(RICHTEXT_IMAGE_PLACEHOLDER).count(), 10);
        assert_eq!(flat.text.matches(RICHTEXT_IMAGE_FALLBACK).count(), 2);
        assert!(flat.text.ends_with(&RICHTEXT_IMAGE_FALLBACK.repeat(2)));
    }

    #[test]
    fn picture_without_code_degrades_to_marker() {
        let flat = flatten(&nodes(serde_json::json!([
            { "type": "picture" },
            { "type": "picture", "downloadCode": "" },
        ])));
        assert_eq!(flat.text, RICHTEXT_IMAGE_FALLBACK.repeat(2));
        assert!(flat.media_tasks.is_empty());
    }

    #[test]
    fn unknown_nodes_are_skipped() {
        let flat = flatten(&nodes(serde_json::json!([
            { "type": "video", "downloadCode": "v" },
            { "text": "hi" },
            {},
        ])));
        assert_eq!(flat.text, "hi");
        assert!(flat.media_tasks.is_empty());
    }

    #[test]
    fn text_wins_over_picture_marker_on_same_node() {
        let flat = flatten(&nodes(serde_json::json!([
            { "text": "caption", "type": "picture", "downloadCode": "x" },
        ])));
        assert_eq!(flat.text, "caption");
        assert!(flat.media_tasks.is_empty());
    }
}
