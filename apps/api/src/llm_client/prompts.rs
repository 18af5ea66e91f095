// Shared prompt fragments. Services that call the LLM keep their own
// prompts.rs next to them and pull these in.

/// System prompt fragment that enforces JSON-only output.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences.";

/// Tone shared by everything Luna writes on the user's behalf.
pub const SWEDISH_BUSINESS_TONE: &str = "Write in Swedish. \
    Use a professional, concise tone suited to a healthcare staffing agency. \
    Never invent names, dates, or personal identifiers that are not in the input.";
