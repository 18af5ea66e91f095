pub const DRAFT_SYSTEM: &str = "You draft formal requests for criminal record extracts \
    (registerutdrag) on behalf of a healthcare staffing agency.";

pub const DRAFT_PROMPT: &str = r#"Draft an email requesting a registerutdrag for the consultant below.

Consultant: {name}
Personal identity number: {personal_id}
Purpose: {purpose}
Requested by: {requester}

Return a JSON object with exactly two string fields:
{"subject": "...", "body": "..."}

The body is plain text with paragraphs separated by blank lines. Include the
consultant's name and personal identity number verbatim and close with the
requester's name."#;
