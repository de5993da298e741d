use serde_json::Value;

use crate::error::StreamWarning;
use crate::stream::{FragmentParser, ParseStep};

/// Reads `choices[0].delta.content` from each chunk.
pub(crate) struct ChatChunkParser {
    dialect: &'static str,
}

impl ChatChunkParser {
    pub(crate) fn new(dialect: &'static str) -> Self {
        Self { dialect }
    }
}

impl FragmentParser for ChatChunkParser {
    fn dialect(&self) -> &'static str {
        self.dialect
    }

    fn parse(&mut self, data: &str) -> ParseStep {
        let value: Value = match serde_json::from_str(data) {
            Ok(value) => value,
            Err(err) => return ParseStep::Warn(StreamWarning::invalid_json(err, data)),
        };
        let Some(choices) = value.get("choices").and_then(Value::as_array) else {
            return ParseStep::Warn(StreamWarning::unexpected_shape("missing `choices`", data));
        };
        // Usage and prompt-filter chunks arrive with an empty choice list.
        let Some(choice) = choices.first() else {
            return ParseStep::Skip;
        };
        match choice
            .get("delta")
            .and_then(|delta| delta.get("content"))
        {
            Some(Value::String(text)) if !text.is_empty() => ParseStep::Emit(text.clone()),
            Some(Value::String(_)) | Some(Value::Null) | None => ParseStep::Skip,
            Some(_) => ParseStep::Warn(StreamWarning::unexpected_shape(
                "`delta.content` is not a string",
                data,
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use futures_util::stream;

    use super::*;
    use crate::http::HttpBodyStream;
    use crate::stream::text_stream;

    #[test]
    fn parser_extracts_delta_content() {
        let mut parser = ChatChunkParser::new("openai_chat");
        assert_eq!(
            parser.parse(r#"{"choices":[{"delta":{"content":"Hel"}}]}"#),
            ParseStep::Emit("Hel".to_string())
        );
        assert_eq!(
            parser.parse(r#"{"choices":[{"delta":{"role":"assistant"}}]}"#),
            ParseStep::Skip
        );
        assert_eq!(parser.parse(r#"{"choices":[]}"#), ParseStep::Skip);
        assert!(matches!(
            parser.parse("{not json"),
            ParseStep::Warn(StreamWarning::InvalidJson { .. })
        ));
        assert!(matches!(
            parser.parse(r#"{"object":"x"}"#),
            ParseStep::Warn(StreamWarning::UnexpectedShape { .. })
        ));
    }

    #[tokio::test]
    async fn stream_stops_at_done_marker() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![Ok(concat!(
            "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"lo\"}}]}\n\n",
            "data: [DONE]\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ignored\"}}]}\n\n",
        )
        .as_bytes()
        .to_vec())]));

        let fragments: Vec<String> = text_stream(body, ChatChunkParser::new("openai_chat"), None)
            .map(|item| item.expect("fragment"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn malformed_chunks_are_skipped() {
        let body: HttpBodyStream = Box::pin(stream::iter(vec![Ok(concat!(
            "data: {broken\n\n",
            "data: {\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n\n",
        )
        .as_bytes()
        .to_vec())]));

        let fragments: Vec<String> = text_stream(body, ChatChunkParser::new("openai_chat"), None)
            .map(|item| item.expect("fragment"))
            .collect()
            .await;
        assert_eq!(fragments, vec!["ok"]);
    }
}
