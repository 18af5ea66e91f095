use serde::Deserialize;

use crate::mail::MailError;

/// A message ready for the mail API.
#[derive(Debug, Clone, PartialEq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub html: String,
}

#[derive(Debug, Deserialize)]
pub struct ComposeRequest {
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

impl OutgoingMail {
    pub fn from_plain_text(req: ComposeRequest) -> Result<Self, MailError> {
        let to = clean_addresses(req.to)?;
        if to.is_empty() {
            return Err(MailError::InvalidMessage("at least one recipient is required".into()));
        }
        if req.subject.trim().is_empty() {
            return Err(MailError::InvalidMessage("subject cannot be empty".into()));
        }
        Ok(Self {
            to,
            cc: clean_addresses(req.cc)?,
            bcc: clean_addresses(req.bcc)?,
            subject: req.subject.trim().to_string(),
            html: plain_text_to_html(&req.body),
        })
    }
}

fn clean_addresses(raw: Vec<String>) -> Result<Vec<String>, MailError> {
    raw.into_iter()
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty())
        .map(|a| {
            if is_plausible_address(&a) {
                Ok(a)
            } else {
                Err(MailError::InvalidMessage(format!("invalid address '{a}'")))
            }
        })
        .collect()
}

fn is_plausible_address(a: &str) -> bool {
    match a.split_once('@') {
        Some((local, domain)) => !local.is_empty() && domain.contains('.') && !a.contains(' '),
        None => false,
    }
}

/// Blank-line separated blocks become `<p>` elements; single newlines inside a
/// block become `<br>`. Text is HTML-escaped.
pub fn plain_text_to_html(text: &str) -> String {
    let normalized = text.replace("\r\n", "\n");
    normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .map(|block| {
            let lines: Vec<String> = block.lines().map(escape_html).collect();
            format!("<p>{}</p>", lines.join("<br>"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
