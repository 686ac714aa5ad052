use serde::{Deserialize, Serialize};

const VERDICT_MARKER: &str = "**Verdict:";
const EMPHASIS: &str = "**";

/// One renderable unit of an authenticity report. Produced in input order;
/// the block sequence IS the rendered report order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportBlock {
    SectionHeading {
        level: u8,
        text: String,
    },
    VerdictStatement {
        prefix: String,
        verdict: String,
        is_authentic: bool,
        remainder: String,
    },
    EnumeratedItem {
        index: u32,
        title: String,
        body: String,
    },
    BulletItem {
        text: String,
    },
    Spacer,
    Paragraph {
        text: String,
    },
}

/// Classifies free-form report text line by line into typed blocks.
///
/// The service's output is loosely structured prose with markdown-like
/// conventions, so this is a forgiving line-local classifier rather than a
/// strict markdown parser: each line maps to exactly one block, rules are
/// tried in order, first match wins, and anything unrecognized degrades to a
/// `Paragraph`. Total over arbitrary input.
pub fn parse_report(text: &str) -> Vec<ReportBlock> {
    text.split('\n').map(classify_line).collect()
}

fn classify_line(line: &str) -> ReportBlock {
    if let Some(rest) = line.strip_prefix("## ") {
        return ReportBlock::SectionHeading {
            level: 2,
            text: rest.to_string(),
        };
    }
    if let Some(rest) = line.strip_prefix("### ") {
        return ReportBlock::SectionHeading {
            level: 3,
            text: rest.to_string(),
        };
    }
    if let Some(block) = parse_verdict(line) {
        return block;
    }
    if let Some(block) = parse_enumerated_item(line) {
        return block;
    }
    if let Some(rest) = line.trim_start().strip_prefix("- ") {
        return ReportBlock::BulletItem {
            text: rest.to_string(),
        };
    }
    if line.trim().is_empty() {
        return ReportBlock::Spacer;
    }
    ReportBlock::Paragraph {
        text: line.to_string(),
    }
}

fn parse_verdict(line: &str) -> Option<ReportBlock> {
    let (prefix, rest) = line.split_once(VERDICT_MARKER)?;
    let (verdict, remainder) = match rest.split_once(EMPHASIS) {
        Some((verdict, remainder)) => (verdict, remainder),
        None => (rest, ""),
    };
    // Literal substring heuristic over the label, not sentiment analysis.
    let is_authentic = verdict.to_lowercase().contains("real");
    Some(ReportBlock::VerdictStatement {
        prefix: prefix.to_string(),
        verdict: verdict.to_string(),
        is_authentic,
        remainder: remainder.to_string(),
    })
}

fn parse_enumerated_item(line: &str) -> Option<ReportBlock> {
    let digits = line.chars().take_while(|ch| ch.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let index = line[..digits].parse::<u32>().ok()?;
    let rest = line[digits..].strip_prefix(". ")?.strip_prefix(EMPHASIS)?;
    let (title_raw, after) = rest.split_once(EMPHASIS)?;
    if title_raw.is_empty() || title_raw.contains('*') {
        return None;
    }
    // The colon lands inside the emphasis span (`**Title:**`) or right after
    // it (`**Title**:`); the stored title carries neither.
    let title = title_raw.strip_suffix(':').unwrap_or(title_raw);
    let body = after.strip_prefix(':').unwrap_or(after).trim_start();
    Some(ReportBlock::EnumeratedItem {
        index,
        title: title.to_string(),
        body: body.to_string(),
    })
}
