//! Prompt assembly for the Lumi chat persona and the journal analysis agent.

use crate::store::StoredJournalEntry;

/// Lumi persona preamble sent ahead of every chat prompt.
pub const BASE_PROMPT: &str = "
You are Lumi, a compassionate mental health support assistant. You help users who are feeling stressed, anxious, or overwhelmed.
You are not a medical professional and never offer clinical advice or diagnosis.
Always encourage users to reach out to licensed therapists or mental health hotlines if they are in crisis.
Keep your responses warm, empathetic, and supportive. Keep the responses concise and to the point preferrably not more than 2 sentences.
";

pub const RISKY_POST_HINT: &str = "⚠️ The user may be at mental health risk based on their recent social media post. \
Respond with high empathy, but don’t be robotic. You may include a grounding exercise, gentle humor, or supportive encouragement if appropriate. \
Feel free to share one actionable tip (like deep breathing, journaling, or a distraction strategy). \
You can nudge them to talk to a mental health professional, but prioritize making them feel safe and understood.\n";

pub const HIGH_STRESS_HINT: &str = "🧘 The user seems highly stressed. Speak gently and offer helpful suggestions like relaxation techniques or supportive thoughts.\n";

/// Stress scores above this switch the prompt to the high-stress hint.
pub const HIGH_STRESS_THRESHOLD: f64 = 0.7;

/// Emotions that get an explicit affirmation hint.
const AFFIRM_EMOTIONS: &[&str] = &["sad", "angry", "fearful"];

pub const EMPTY_HISTORY: &str = "No journal entries found for analysis.";
pub const HISTORY_SEPARATOR: &str = "---  ENTRY SEPARATOR  ---";

/// Tone scaffolding. Precedence: risky post > high stress > affirming emotion.
pub fn tone_hints(risky_post: bool, stress: Option<f64>, emotion: Option<&str>) -> String {
    if risky_post {
        return RISKY_POST_HINT.to_string();
    }
    if stress.is_some_and(|s| s > HIGH_STRESS_THRESHOLD) {
        return HIGH_STRESS_HINT.to_string();
    }
    match emotion {
        Some(e) if AFFIRM_EMOTIONS.contains(&e) => {
            format!("The user feels {}. Be affirming and avoid advice overload.\n", e)
        }
        _ => String::new(),
    }
}

/// Memory section of the chat prompt. Always present; the body is empty for a fresh session.
pub fn memory_section(memory: &str) -> String {
    format!("Conversation so far:\n{}\n\n", memory)
}

/// Full chat prompt: persona, session memory, tone hints, then the user's turn.
pub fn chat_prompt(memory: &str, hints: &str, user_input: &str) -> String {
    format!(
        "{}\n\n{}{}User: {}",
        BASE_PROMPT.trim(),
        memory_section(memory),
        hints,
        user_input
    )
}

/// Canned reminder returned instead of a model reply when habits are pending today.
pub fn habit_reminder(habit_names: &[String]) -> String {
    format!(
        "🌱 Just a gentle reminder — don't forget your healthy habits today: {}. You’re doing great, keep going! 💪",
        habit_names.join(", ")
    )
}

/// Historical context block for the journal prompt. `entries` are newest first.
pub fn format_history(entries: &[StoredJournalEntry]) -> String {
    if entries.is_empty() {
        return EMPTY_HISTORY.to_string();
    }
    entries
        .iter()
        .map(|e| {
            format!(
                "\nTheme: {},\nAction Taken: {},\nCoping Suggestions: {}\n",
                e.analysis.essence_theme,
                e.analysis.action_required,
                e.analysis.coping_suggestions.join(", ")
            )
        })
        .collect::<Vec<_>>()
        .join(HISTORY_SEPARATOR)
}

/// Unified safety + therapeutic analysis prompt for one journal entry.
pub fn journal_prompt(entry: &str, history: &str) -> String {
    format!(
        r#"You are the 'Moodmate Unified Agent.' Your task is two-fold:
1.  **Safety Check:** Analyze the user's current entry for psychological risk.
2.  **Therapeutic Analysis:** Analyze the current entry and synthesize a **Pattern Analysis** using the provided historical context.

**CRITICAL RULES:**
1.  **Strict Output Format:** You MUST output ONLY a single, valid JSON object. Do not include any introductory text, commentary, or markdown fences.
2.  **Action Determination:** Set 'action_required' to "BLOCK" if 'self_harm_flag' or 'violence_flag' is 'Yes'. Otherwise, set it to "PASS".
3.  **Pattern Synthesis:** Use the 'HISTORICAL DATA' provided below to identify one specific recurring trigger or theme.

** INPUT (Current Journal Entry): **
{entry}

** HISTORICAL DATA (Last 5 Entries): **
{history}

**UNIFIED JSON SCHEMA:**
{{
"overall_risk_level": "[HIGH, MEDIUM, or LOW, based on safety check]",
"action_required": "[PASS or BLOCK, based on safety check]",
"confidence_score": "[Numeric probability between 0.0 (low risk) and 1.0 (high risk)]",
"self_harm_flag": "[Yes or No]",
"violence_flag": "[Yes or No]",
"safety_comment": "[Brief reason for the overall risk level.]",

"historical_pattern": "[A sentence summarizing the recurring emotional or behavioral pattern identified from the HISTORICAL DATA, e.g., 'Anxiety consistently peaks on Sundays.' If no history is available, state 'No clear pattern detected.']",

"essence_theme": "[A single sentence summarizing the core emotional theme of the CURRENT entry.]",
"identified_strengths": [
    "[Identify one specific positive coping mechanism or inner strength.]",
    "[Identify a second strength.]"
],
"reappraisal_message": "[A supportive paragraph (max 3 sentences) that reframes the main negative event.]",
"coping_suggestions": [
    "[Actionable suggestion 1, formatted as a clear Cue-Action statement: 'When [specific situation], I will [specific coping action].']",
    "[Actionable suggestion 2, formatted as a clear Cue-Action statement: 'When [specific situation], I will [specific coping action].']",
    "[Actionable suggestion 3, formatted as a clear Cue-Action statement: 'When [specific situation], I will [specific coping action].']"
],
"chatbot_context": [
    {{"Q": "[A specific question a future chatbot might ask.]", "A": "[A concise answer derived from the CURRENT entry.]"}},
    {{"Q": "[A second specific question.]", "A": "[A concise answer.]"}}
]
}}
"#
    )
}
