//! Split raw content at inline images
//!
//! lopdf's content decoder does not understand `BI … ID … EI`: it stops at
//! the binary image data and drops every operator after it. Inline images
//! are cut out here and passed through byte for byte, so only plain
//! operator runs reach the decoder.

use crate::error::RedactError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Segment<'a> {
    Operators(&'a [u8]),
    /// `BI` through `EI`, inclusive
    InlineImage(&'a [u8]),
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(
        b,
        b'(' | b')' | b'<' | b'>' | b'[' | b']' | b'{' | b'}' | b'/' | b'%'
    )
}

fn is_regular(b: u8) -> bool {
    !is_whitespace(b) && !is_delimiter(b)
}

/// Span of the next token at or after `pos`. Comments are skipped; a
/// string literal is one token, so `BI` inside text never matches.
fn next_token(content: &[u8], mut pos: usize) -> Option<(usize, usize)> {
    let len = content.len();
    loop {
        while pos < len && is_whitespace(content[pos]) {
            pos += 1;
        }
        if pos >= len {
            return None;
        }
        if content[pos] != b'%' {
            break;
        }
        while pos < len && !matches!(content[pos], b'\r' | b'\n') {
            pos += 1;
        }
    }

    let start = pos;
    let end = match content[pos] {
        b'(' => {
            let mut depth = 0usize;
            while pos < len {
                match content[pos] {
                    b'\\' => pos += 1,
                    b'(' => depth += 1,
                    b')' => {
                        depth -= 1;
                        if depth == 0 {
                            pos += 1;
                            break;
                        }
                    }
                    _ => {}
                }
                pos += 1;
            }
            pos.min(len)
        }
        b'<' | b'>' if content.get(pos + 1) == Some(&content[pos]) => pos + 2,
        b'<' => content[pos..]
            .iter()
            .position(|&b| b == b'>')
            .map_or(len, |offset| pos + offset + 1),
        b'/' => {
            pos += 1;
            while pos < len && is_regular(content[pos]) {
                pos += 1;
            }
            pos
        }
        b if is_delimiter(b) => pos + 1,
        _ => {
            while pos < len && is_regular(content[pos]) {
                pos += 1;
            }
            pos
        }
    };
    Some((start, end))
}

/// End (exclusive) of the `EI` closing image data that starts at `from`
fn image_end(content: &[u8], from: usize) -> Option<usize> {
    let mut pos = from.max(1);
    while pos + 2 <= content.len() {
        if &content[pos..pos + 2] == b"EI"
            && is_whitespace(content[pos - 1])
            && content.get(pos + 2).map_or(true, |&b| !is_regular(b))
        {
            return Some(pos + 2);
        }
        pos += 1;
    }
    None
}

pub(crate) fn split_inline_images(content: &[u8]) -> Result<Vec<Segment<'_>>, RedactError> {
    let unterminated = || RedactError::ExportFailure("Unterminated inline image".to_string());

    let mut segments = Vec::new();
    let mut segment_start = 0;
    let mut pos = 0;

    while let Some((start, end)) = next_token(content, pos) {
        pos = end;
        if &content[start..end] != b"BI" {
            continue;
        }

        let data_start = loop {
            let (s, e) = next_token(content, pos).ok_or_else(unterminated)?;
            pos = e;
            if &content[s..e] == b"ID" {
                // One whitespace byte separates ID from the data
                break e + 1;
            }
        };
        let end = image_end(content, data_start).ok_or_else(unterminated)?;

        if start > segment_start {
            segments.push(Segment::Operators(&content[segment_start..start]));
        }
        segments.push(Segment::InlineImage(&content[start..end]));
        segment_start = end;
        pos = end;
    }

    if segment_start < content.len() {
        segments.push(Segment::Operators(&content[segment_start..]));
    }
    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_plain_content_is_one_segment() {
        let content = b"BT /F1 12 Tf (Hi) Tj ET";
        assert_eq!(
            split_inline_images(content).unwrap(),
            vec![Segment::Operators(content)]
        );
    }

    #[test]
    fn test_inline_image_cut_out_verbatim() {
        let content = b"q 10 0 0 10 100 100 cm BI /W 2 /H 2 /CS /G /BPC 8 ID \x01\x02\x03\x04 EI Q\nBT (X) Tj ET";
        let segments = split_inline_images(content).unwrap();
        assert_eq!(
            segments,
            vec![
                Segment::Operators(b"q 10 0 0 10 100 100 cm "),
                Segment::InlineImage(b"BI /W 2 /H 2 /CS /G /BPC 8 ID \x01\x02\x03\x04 EI"),
                Segment::Operators(b" Q\nBT (X) Tj ET"),
            ]
        );
    }

    #[test]
    fn test_image_data_containing_ei_bytes() {
        // "EI" not preceded by whitespace is image data
        let content = b"BI /W 1 /H 1 ID xEIy EI Q";
        let segments = split_inline_images(content).unwrap();
        assert_eq!(segments[0], Segment::InlineImage(b"BI /W 1 /H 1 ID xEIy EI"));
    }

    #[test]
    fn test_bi_inside_string_or_comment_ignored() {
        let content = b"BT (a BI b) Tj ET % BI\n";
        assert_eq!(
            split_inline_images(content).unwrap(),
            vec![Segment::Operators(content)]
        );
    }

    #[test]
    fn test_unterminated_image_fails() {
        assert!(matches!(
            split_inline_images(b"BI /W 1 /H 1 ID \x00\x00"),
            Err(RedactError::ExportFailure(_))
        ));
        assert!(matches!(
            split_inline_images(b"q BI /W 1"),
            Err(RedactError::ExportFailure(_))
        ));
    }
}
