//! Action items from an LLM action plan.
//!
//! The plan is free text with fixed section headers. Items are the dash
//! lines between `ÅTGÄRDER:` and `UPPFÖLJNING:`. Missing headers or items
//! yield an empty list, never an error.

pub const ACTIONS_HEADER: &str = "ÅTGÄRDER:";
pub const FOLLOW_UP_HEADER: &str = "UPPFÖLJNING:";

pub fn extract_action_items(plan: &str) -> Vec<String> {
    let Some(start) = plan.find(ACTIONS_HEADER) else {
        return Vec::new();
    };
    let body = &plan[start + ACTIONS_HEADER.len()..];
    let Some(end) = body.find(FOLLOW_UP_HEADER) else {
        return Vec::new();
    };

    body[..end]
        .lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix('-'))
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_single_item() {
        let plan = "ÅTGÄRDER:\n- call back\nUPPFÖLJNING:\n...";
        assert_eq!(extract_action_items(plan), vec!["call back"]);
    }

    #[test]
    fn test_full_plan_with_narrative_sections() {
        let plan = "SAMMANFATTNING:\nKunden behöver två sjuksköterskor.\n\n\
                    ÅTGÄRDER:\n- Skicka CV för Anna\n  -  Boka möte på fredag \n\
                    Notera: kunden är stressad\n\nUPPFÖLJNING:\n- Ring igen om en vecka";
        assert_eq!(
            extract_action_items(plan),
            vec!["Skicka CV för Anna", "Boka möte på fredag"]
        );
    }

    #[test]
    fn test_missing_action_header_is_empty() {
        assert!(extract_action_items("Inga rubriker här\n- något").is_empty());
    }

    #[test]
    fn test_missing_follow_up_header_is_empty() {
        assert!(extract_action_items("ÅTGÄRDER:\n- ring kunden").is_empty());
    }

    #[test]
    fn test_empty_section_and_bare_dashes() {
        assert!(extract_action_items("ÅTGÄRDER:\n-\n - \nUPPFÖLJNING:").is_empty());
        assert!(extract_action_items("").is_empty());
    }
}
