use crate::errors::{PilotError, PilotResult};
use crate::llm::types::{LlmResponse, StreamChunk, StreamChunkKind};

/// Reassembles SSE lines from network chunks. Bytes are kept until a `\n`
/// arrives, so a UTF-8 sequence split across two chunks decodes intact.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    /// Complete, trimmed, non-empty lines found after appending `bytes`.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();
        for &b in bytes {
            if b != b'\n' {
                self.pending.push(b);
                continue;
            }
            let line = String::from_utf8_lossy(&self.pending).trim().to_string();
            self.pending.clear();
            if !line.is_empty() {
                lines.push(line);
            }
        }
        lines
    }
}

/// Folds one SSE line into `out`. Returns `true` once the stream says it is done.
/// A data line that is not valid JSON fails the whole reply.
pub fn accumulate_line(out: &mut LlmResponse, line: &str) -> PilotResult<bool> {
    let Some(chunk) = parse_sse_line(line)? else {
        return Ok(false);
    };
    match chunk.kind {
        StreamChunkKind::Reasoning => out.reasoning.push_str(&chunk.content),
        StreamChunkKind::Content => out.content.push_str(&chunk.content),
        StreamChunkKind::Done => return Ok(true),
    }
    Ok(false)
}

/// Parses a raw SSE line (OpenAI-compatible format) into a StreamChunk.
/// Returns None if the line is a keep-alive or non-data line.
pub fn parse_sse_line(line: &str) -> PilotResult<Option<StreamChunk>> {
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let Some(data) = line.strip_prefix("data:").map(str::trim) else {
        return Ok(None);
    };

    if data == "[DONE]" {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    let json: serde_json::Value =
        serde_json::from_str(data).map_err(|e| PilotError::SseParsing(e.to_string()))?;

    let Some(first) = json["choices"].as_array().and_then(|c| c.first()) else {
        return Ok(None);
    };
    let delta = &first["delta"];

    // Reasoning content (some models like DeepSeek expose this)
    if let Some(reasoning) = delta["reasoning_content"].as_str() {
        if !reasoning.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Reasoning,
                content: reasoning.to_string(),
            }));
        }
    }

    if let Some(content) = delta["content"].as_str() {
        if !content.is_empty() {
            return Ok(Some(StreamChunk {
                kind: StreamChunkKind::Content,
                content: content.to_string(),
            }));
        }
    }

    // Finish reason signals done
    if first["finish_reason"].as_str().is_some() {
        return Ok(Some(StreamChunk {
            kind: StreamChunkKind::Done,
            content: String::new(),
        }));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_delta() {
        let chunk = parse_sse_line(r#"data: {"choices":[{"delta":{"content":"click(1,2)"}}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Content);
        assert_eq!(chunk.content, "click(1,2)");
    }

    #[test]
    fn reasoning_delta_wins_over_empty_content() {
        let chunk = parse_sse_line(
            r#"data: {"choices":[{"delta":{"reasoning_content":"look left","content":""}}]}"#,
        )
        .unwrap()
        .unwrap();
        assert_eq!(chunk.kind, StreamChunkKind::Reasoning);
    }

    #[test]
    fn done_markers() {
        let done = parse_sse_line("data: [DONE]").unwrap().unwrap();
        assert_eq!(done.kind, StreamChunkKind::Done);
        let finish = parse_sse_line(r#"data: {"choices":[{"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap()
            .unwrap();
        assert_eq!(finish.kind, StreamChunkKind::Done);
    }

    #[test]
    fn keepalives_and_garbage() {
        assert!(parse_sse_line(": ping").unwrap().is_none());
        assert!(parse_sse_line("event: message").unwrap().is_none());
        assert!(parse_sse_line("data: {not json").is_err());
    }

    fn fold(chunks: &[&[u8]]) -> PilotResult<LlmResponse> {
        let mut lines = LineBuffer::default();
        let mut out = LlmResponse::default();
        for chunk in chunks {
            for line in lines.push(chunk) {
                if accumulate_line(&mut out, &line)? {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }

    #[test]
    fn line_split_across_chunks() {
        let mut lines = LineBuffer::default();
        assert!(lines.push(br#"data: {"choices":[{"delta":{"con"#).is_empty());
        let done = lines.push(b"tent\":\"click(1,2)\"}}]}\n\ndata: [DO");
        assert_eq!(done, vec![r#"data: {"choices":[{"delta":{"content":"click(1,2)"}}]}"#.to_string()]);
        assert_eq!(lines.push(b"NE]\r\n"), vec!["data: [DONE]".to_string()]);
    }

    #[test]
    fn multibyte_char_split_across_chunks() {
        let line = "data: {\"choices\":[{\"delta\":{\"content\":\"caf\u{e9} \u{4f60}\u{597d}\"}}]}\n";
        let bytes = line.as_bytes();
        // Cut inside the two-byte é.
        let cut = line.find('\u{e9}').unwrap() + 1;
        let out = fold(&[&bytes[..cut], &bytes[cut..], b"data: [DONE]\n"]).unwrap();
        assert_eq!(out.content, "caf\u{e9} \u{4f60}\u{597d}");
    }

    #[test]
    fn reasoning_and_content_are_kept_apart() {
        let out = fold(&[
            br#"data: {"choices":[{"delta":{"reasoning_content":"menu is top left"}}]}"#,
            b"\n: ping\n",
            br#"data: {"choices":[{"delta":{"content":"click(5,5)"}}]}"#,
            b"\ndata: [DONE]\n",
            br#"data: {"choices":[{"delta":{"content":"ignored"}}]}"#,
            b"\n",
        ])
        .unwrap();
        assert_eq!(out.reasoning, "menu is top left");
        assert_eq!(out.content, "click(5,5)");
    }

    #[test]
    fn malformed_data_line_fails_the_reply() {
        let err = fold(&[
            br#"data: {"choices":[{"delta":{"content":"click("}}]}"#,
            b"\ndata: {\"choices\":[{\"delta\n",
        ])
        .unwrap_err();
        assert!(matches!(err, PilotError::SseParsing(_)));
    }
}
