use crate::lorebook::active_lore;
use annie_core::character::{AgentConfig, NarrativePerspective};
use annie_core::{AppSettings, Character};
use std::fmt::Write;

/// The system prompt for one turn plus the lore entries it pulled in.
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledPrompt {
    pub system_prompt: String,
    pub active_lore: Vec<String>,
}

pub struct ContextAssembler;

impl ContextAssembler {
    /// Concatenate the character, user and lore context in a fixed order.
    /// No ranking or truncation happens here.
    pub fn build(
        character: &Character,
        settings: &AppSettings,
        input: &str,
        is_group: bool,
    ) -> AssembledPrompt {
        let persona = &settings.user_persona;
        let mut p = String::new();

        p.push_str(&settings.model_preset.system_instruction);
        p.push('\n');
        let _ = write!(
            p,
            "[USER INFO]\nName: {}\nDescription: {}\nNote: {}\n\n",
            persona.name, persona.description, persona.custom_prompt
        );

        if is_group {
            let _ = writeln!(p, "You are in a group chat. Your name is {}.", character.name);
        } else {
            let _ = writeln!(p, "You are {}.", character.name);
        }
        let _ = write!(
            p,
            "Description: {}\nPersona: {}\nScenario: {}\n",
            character.description, character.persona, character.scenario
        );
        let _ = writeln!(p, "Expression Style: {}", character.expression_style);

        let style = character.action_style.normalized();
        if style.enabled {
            p.push_str("[ACTION & NARRATION GUIDELINES]\n");
            let perspective = match style.narrative_perspective {
                NarrativePerspective::First => "First person (I, me)",
                _ => "Third person (She, He)",
            };
            let _ = writeln!(p, "- Perspective: {}", perspective);
            let _ = writeln!(
                p,
                "- Detail Level: {} (Higher level means more environmental and sensory details)",
                style.detail_level.as_str()
            );
            if style.include_inner_thoughts {
                p.push_str(
                    "- MUST include inner thoughts/psychological descriptions, e.g., (thinking: ...)\n",
                );
            }
            if !style.custom_formatting.is_empty() {
                let _ = writeln!(p, "- Formatting Rules: {}", style.custom_formatting);
            }
        }

        if !character.memories.is_empty() {
            let _ = write!(
                p,
                "\n[LONG-TERM MEMORY]\nThe following are important memories you have with {}:\n",
                persona.name
            );
            for m in &character.memories {
                let _ = writeln!(p, "- {} (Importance: {})", m.content, m.importance);
            }
        }

        let lore = active_lore(input, &character.world_info);
        if !lore.is_empty() {
            p.push_str("\n[WORLD KNOWLEDGE / LOREBOOK]\nRelevant information triggered by context:\n");
            for content in &lore {
                let _ = writeln!(p, "> {}", content);
            }
        }

        if let Some(agent) = character.agent_config.as_ref().filter(|a| a.enabled) {
            Self::push_agent_block(&mut p, agent);
        }

        AssembledPrompt {
            system_prompt: p,
            active_lore: lore,
        }
    }

    fn push_agent_block(p: &mut String, agent: &AgentConfig) {
        p.push_str("\n[AGENT MODE ACTIVE]\n");
        let _ = writeln!(p, "Role: {}", agent.role.as_str());
        let _ = writeln!(p, "Available tools: {}", agent.allowed_tools.join(", "));
        let _ = writeln!(
            p,
            "Thinking Budget: {} tokens (Use appropriately)",
            agent.thinking_budget
        );
        if agent.require_approval {
            p.push_str(
                "CRITICAL: You MUST ask for user approval before performing irreversible actions.\n",
            );
        }
        p.push_str("If you need to perform an action, format it as: [ACTION: tool_name args]");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use annie_core::character::{ActionStyle, ActionStyleConfig, DetailLevel};

    fn annie() -> Character {
        let mut c = Character::new("Annie", "v-standard");
        c.description = "A cheerful girl".into();
        c.persona = "Kind and curious".into();
        c.scenario = "At a cafe".into();
        c.expression_style = "casual".into();
        c
    }

    #[test]
    fn test_block_order() {
        let mut c = annie();
        c.action_style = ActionStyle::Structured(ActionStyleConfig {
            enabled: true,
            ..ActionStyleConfig::default()
        });
        c.add_memory("Met at the park", 7);
        c.add_lore(vec!["cafe".into()], "The cafe serves matcha.");
        c.agent_config = Some(AgentConfig {
            enabled: true,
            ..AgentConfig::default()
        });
        let mut s = AppSettings::default();
        s.model_preset.system_instruction = "SYS".into();
        s.user_persona.name = "Kai".into();

        let out = ContextAssembler::build(&c, &s, "going to the Cafe", false);
        let p = &out.system_prompt;
        assert!(p.starts_with("SYS\n[USER INFO]\nName: Kai\n"));
        let order = [
            "[USER INFO]",
            "You are Annie.",
            "Description: A cheerful girl",
            "Expression Style: casual",
            "[ACTION & NARRATION GUIDELINES]",
            "[LONG-TERM MEMORY]",
            "- Met at the park (Importance: 7)",
            "[WORLD KNOWLEDGE / LOREBOOK]",
            "> The cafe serves matcha.",
            "[AGENT MODE ACTIVE]",
            "Available tools: web_search",
            "[ACTION: tool_name args]",
        ];
        let mut last = 0;
        for needle in order {
            let at = p[last..].find(needle).map(|i| i + last);
            assert!(at.is_some(), "missing or out of order: {}", needle);
            last = at.unwrap_or(last);
        }
        assert_eq!(out.active_lore, vec!["The cafe serves matcha.".to_string()]);
    }

    #[test]
    fn test_group_identity_line() {
        let out = ContextAssembler::build(&annie(), &AppSettings::default(), "hi", true);
        assert!(out
            .system_prompt
            .contains("You are in a group chat. Your name is Annie.\n"));
        assert!(!out.system_prompt.contains("You are Annie."));
    }

    #[test]
    fn test_disabled_style_and_empty_sections_are_omitted() {
        let out = ContextAssembler::build(&annie(), &AppSettings::default(), "hi", false);
        let p = &out.system_prompt;
        assert!(!p.contains("[ACTION & NARRATION GUIDELINES]"));
        assert!(!p.contains("[LONG-TERM MEMORY]"));
        assert!(!p.contains("[WORLD KNOWLEDGE"));
        assert!(!p.contains("[AGENT MODE ACTIVE]"));
    }

    #[test]
    fn test_legacy_style_is_normalized() {
        let mut c = annie();
        c.action_style = ActionStyle::Legacy("Use brackets".into());
        let p = ContextAssembler::build(&c, &AppSettings::default(), "hi", false).system_prompt;
        assert!(p.contains("- Perspective: Third person (She, He)"));
        assert!(p.contains("- Detail Level: medium"));
        assert!(p.contains("- MUST include inner thoughts"));
        assert!(p.contains("- Formatting Rules: Use brackets"));
    }

    #[test]
    fn test_first_person_without_extras() {
        let mut c = annie();
        c.action_style = ActionStyle::Structured(ActionStyleConfig {
            enabled: true,
            narrative_perspective: NarrativePerspective::First,
            detail_level: DetailLevel::High,
            include_inner_thoughts: false,
            custom_formatting: String::new(),
        });
        let p = ContextAssembler::build(&c, &AppSettings::default(), "hi", false).system_prompt;
        assert!(p.contains("- Perspective: First person (I, me)"));
        assert!(p.contains("- Detail Level: high"));
        assert!(!p.contains("inner thoughts"));
        assert!(!p.contains("Formatting Rules"));
    }

    #[test]
    fn test_agent_without_approval() {
        let mut c = annie();
        c.agent_config = Some(AgentConfig {
            enabled: true,
            require_approval: false,
            thinking_budget: 1024,
            ..AgentConfig::default()
        });
        let p = ContextAssembler::build(&c, &AppSettings::default(), "hi", false).system_prompt;
        assert!(p.contains("Role: companion"));
        assert!(p.contains("Thinking Budget: 1024 tokens"));
        assert!(!p.contains("CRITICAL"));
    }
}
