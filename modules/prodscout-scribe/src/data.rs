//! Timed subtitle data and the SRT/WebVTT formats around it.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ScribeError};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtitleSegment {
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<SubtitleSegment>,
}

impl Transcript {
    pub fn new(segments: Vec<SubtitleSegment>) -> Self {
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn to_plain_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn to_srt(&self) -> String {
        let mut out = String::new();
        for (i, seg) in self.segments.iter().enumerate() {
            let _ = write!(
                out,
                "{}\n{} --> {}\n{}\n\n",
                i + 1,
                srt_timestamp(seg.start_ms),
                srt_timestamp(seg.end_ms),
                seg.text
            );
        }
        out
    }

    /// Parse an SRT document. Index lines are optional; malformed cues
    /// are skipped rather than failing the whole file.
    pub fn parse_srt(raw: &str) -> Result<Self> {
        let mut segments = Vec::new();
        for block in raw.replace('\r', "").split("\n\n") {
            let mut lines = block.lines().filter(|l| !l.trim().is_empty()).peekable();
            let Some(mut first) = lines.next() else {
                continue;
            };
            // Optional numeric index before the timing line.
            if !first.contains("-->") {
                match lines.next() {
                    Some(next) => first = next,
                    None => continue,
                }
            }
            let Some((start, end)) = parse_timing_line(first) else {
                continue;
            };
            let text = lines.collect::<Vec<_>>().join(" ").trim().to_string();
            if !text.is_empty() {
                segments.push(SubtitleSegment {
                    start_ms: start,
                    end_ms: end,
                    text,
                });
            }
        }
        if segments.is_empty() {
            return Err(ScribeError::Subtitle("no cues in SRT input".into()));
        }
        Ok(Self::new(segments))
    }

    /// Parse a WebVTT document, tolerating cue settings, NOTE/STYLE
    /// blocks, and inline timing/class tags from auto-generated tracks.
    pub fn parse_vtt(raw: &str) -> Result<Self> {
        let mut segments: Vec<SubtitleSegment> = Vec::new();
        let mut lines = raw.replace('\r', "");
        if let Some(rest) = lines.strip_prefix('\u{feff}') {
            lines = rest.to_string();
        }

        let mut iter = lines.lines().peekable();
        while let Some(line) = iter.next() {
            let trimmed = line.trim();
            if trimmed.starts_with("WEBVTT")
                || trimmed.starts_with("NOTE")
                || trimmed.starts_with("STYLE")
                || trimmed.starts_with("Kind:")
                || trimmed.starts_with("Language:")
            {
                continue;
            }
            let Some((start, end)) = parse_timing_line(trimmed) else {
                continue;
            };

            let mut text_lines = Vec::new();
            while let Some(next) = iter.peek() {
                if next.trim().is_empty() || next.contains("-->") {
                    break;
                }
                let cleaned = strip_inline_tags(next.trim());
                if !cleaned.is_empty() {
                    text_lines.push(cleaned);
                }
                iter.next();
            }
            let text = text_lines.join(" ").trim().to_string();
            if text.is_empty() {
                continue;
            }
            // Auto-generated tracks repeat the previous cue's text.
            if segments.last().map(|s: &SubtitleSegment| s.text.as_str()) == Some(text.as_str()) {
                continue;
            }
            segments.push(SubtitleSegment {
                start_ms: start,
                end_ms: end,
                text,
            });
        }

        if segments.is_empty() {
            return Err(ScribeError::Subtitle("no cues in VTT input".into()));
        }
        Ok(Self::new(segments))
    }
}

fn srt_timestamp(ms: u64) -> String {
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1000;
    let millis = ms % 1000;
    format!("{hours:02}:{minutes:02}:{seconds:02},{millis:03}")
}

/// `HH:MM:SS.mmm --> HH:MM:SS.mmm [settings]`, hours optional, comma or
/// dot before the milliseconds.
fn parse_timing_line(line: &str) -> Option<(u64, u64)> {
    let (start_raw, rest) = line.split_once("-->")?;
    let end_raw = rest.trim().split_whitespace().next()?;
    Some((parse_timestamp(start_raw.trim())?, parse_timestamp(end_raw)?))
}

fn parse_timestamp(raw: &str) -> Option<u64> {
    let normalized = raw.replace(',', ".");
    let mut parts: Vec<&str> = normalized.split(':').collect();
    if parts.len() == 2 {
        parts.insert(0, "0");
    }
    if parts.len() != 3 {
        return None;
    }
    let hours: u64 = parts[0].parse().ok()?;
    let minutes: u64 = parts[1].parse().ok()?;
    let (secs, millis) = match parts[2].split_once('.') {
        Some((s, m)) => {
            let frac = format!("{:0<3}", m.chars().take(3).collect::<String>());
            (s.parse::<u64>().ok()?, frac.parse::<u64>().ok()?)
        }
        None => (parts[2].parse().ok()?, 0),
    };
    Some(hours * 3_600_000 + minutes * 60_000 + secs * 1000 + millis)
}

/// Remove `<c>`, `</c>`, and `<00:00:01.500>` style inline tags.
fn strip_inline_tags(line: &str) -> String {
    let mut out = String::with_capacity(line.len());
    let mut in_tag = false;
    for c in line.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(c),
            _ => {}
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srt_round_trip() {
        let transcript = Transcript::new(vec![
            SubtitleSegment {
                start_ms: 1500,
                end_ms: 3000,
                text: "hello there".into(),
            },
            SubtitleSegment {
                start_ms: 3600500,
                end_ms: 3602000,
                text: "an hour in".into(),
            },
        ]);

        let srt = transcript.to_srt();
        assert!(srt.contains("00:00:01,500 --> 00:00:03,000"));
        assert!(srt.contains("01:00:00,500"));

        let parsed = Transcript::parse_srt(&srt).unwrap();
        assert_eq!(parsed.segments, transcript.segments);
    }

    #[test]
    fn srt_without_index_lines_parses() {
        let raw = "00:00:01,000 --> 00:00:02,000\nfirst\n\n00:00:02,000 --> 00:00:03,000\nsecond\n";
        let parsed = Transcript::parse_srt(raw).unwrap();
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[1].text, "second");
    }

    #[test]
    fn vtt_with_tags_and_settings() {
        let raw = "WEBVTT\nKind: captions\nLanguage: en\n\n00:01.500 --> 00:03.000 align:start\n<c>so</c> the<00:00:02.000> theorem\n\n00:03.000 --> 00:04.000\nholds\n";
        let parsed = Transcript::parse_vtt(raw).unwrap();
        assert_eq!(parsed.segments.len(), 2);
        assert_eq!(parsed.segments[0].text, "so the theorem");
        assert_eq!(parsed.segments[0].start_ms, 1500);
    }

    #[test]
    fn vtt_consecutive_duplicates_collapse() {
        let raw = "WEBVTT\n\n00:00.000 --> 00:01.000\nsame line\n\n00:01.000 --> 00:02.000\nsame line\n\n00:02.000 --> 00:03.000\nnew line\n";
        let parsed = Transcript::parse_vtt(raw).unwrap();
        assert_eq!(parsed.segments.len(), 2);
    }

    #[test]
    fn empty_input_is_an_error() {
        assert!(Transcript::parse_srt("").is_err());
        assert!(Transcript::parse_vtt("WEBVTT\n").is_err());
    }

    #[test]
    fn plain_text_joins_segments() {
        let transcript = Transcript::new(vec![
            SubtitleSegment {
                start_ms: 0,
                end_ms: 1,
                text: "a".into(),
            },
            SubtitleSegment {
                start_ms: 1,
                end_ms: 2,
                text: "b".into(),
            },
        ]);
        assert_eq!(transcript.to_plain_text(), "a\nb");
    }
}
