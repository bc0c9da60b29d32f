use crate::markers::{TERMINATION_MARKER, annotate_turn};

pub const PATIENT_OPENING_PROMPT: &str =
    "Please describe your chief complaint and your symptoms to the doctor as your opening statement.";

pub const DOCTOR_OPENING_PROMPT: &str =
    "The patient has arrived. Please begin the consultation.";

pub const DEFAULT_DOCTOR_INSTRUCTION: &str = r#"You are a professional physician. Work out the cause of the patient's complaint through step-by-step questioning.
Keep each question to 2-3 sentences and make it targeted and medically logical.
Do not give a diagnosis before you have gathered enough necessary information; only once the information is sufficient, analyse it and state your diagnostic conclusion."#;

pub const DEFAULT_EXPERT_INSTRUCTION: &str = "You are an experienced general practitioner.";

const DOCTOR_RECORDS_DIRECTIVE: &str = r#"

You can call the search_records tool to look up the patient's medical records and examination reports.
Use the tool only for factual lookups. If there is no tool, or the tool finds nothing, base your judgement on what the patient tells you."#;

/// System instruction for the patient side, built around the supplied profile.
pub fn patient_instruction(profile: &str) -> String {
    format!(
        r#"Play the role of a patient and answer the doctor's questions based on the following profile:
{profile}

Only answer what you know; if you do not know, say so.
Use natural, conversational language and reply in 2-3 sentences.
Do not use medical terminology and never mention any profile or records; describe only how your body feels."#
    )
}

/// Doctor instruction, extended with the records-tool directive when grounding is available.
pub fn doctor_instruction(base: &str, with_records: bool) -> String {
    if with_records {
        format!("{base}{DOCTOR_RECORDS_DIRECTIVE}")
    } else {
        base.to_string()
    }
}

/// Appends the budget and termination directive callers usually give the doctor.
pub fn with_termination_directive(instruction: &str, max_turns: u32) -> String {
    format!(
        "{instruction}\nYou may ask at most {max_turns} rounds of questions. Once you have reached a diagnosis, output {TERMINATION_MARKER}."
    )
}

pub fn doctor_opening(max_turns: u32) -> String {
    annotate_turn(DOCTOR_OPENING_PROMPT, 1, max_turns)
}

/// Prompt sent to the expert, prefixed with background snippets when any survived filtering.
pub fn expert_prompt(question: &str, background: &[&str]) -> String {
    if background.is_empty() {
        return question.to_string();
    }
    format!(
        "Background Information:\n{}\n\nUser Question: {question}",
        background.join("\n")
    )
}
