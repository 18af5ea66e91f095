// Prompts for turning a call transcription into an action plan.
// The section headers are parsed by `action_items`; keep them in sync.

pub const ACTION_PLAN_SYSTEM: &str = "\
You are an assistant for recruiters at a healthcare staffing agency. \
You turn phone call transcriptions into short, structured action plans. \
Always use exactly the section headers you are given, each on its own line, \
and write every action item as a single line starting with '- '.";

pub const ACTION_PLAN_PROMPT: &str = r#"Call with: {contact}

TRANSCRIPTION:
{transcription}

Write an action plan with exactly these sections, in this order:

SAMMANFATTNING:
A few sentences summarising the call.

ÅTGÄRDER:
- One concrete action per line.

UPPFÖLJNING:
When and how to follow up."#;
