//! Instruction text assembly for the remote conversational model.
//!
//! Pure and deterministic: the same template and inputs always produce the
//! same bytes, so the output is golden-testable. A template is a fixed-order
//! concatenation of optional sections; which sections a variant includes is
//! decided by one exhaustive table.

use crate::error::PromptError;
use std::str::FromStr;

/// The prompt variants the companion ships with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptTemplate {
    /// Full session: memory reference, warm-up, topic images, safety check.
    Default,
    /// Chattier persona without the memory reference.
    Talky,
    /// Topic conversation without the on-screen image instructions.
    TalkyNoImg,
    /// Short demo flow.
    DemoTalkyNoImg,
    /// Minimal flow for exercising the tool plumbing.
    Debug,
}

impl PromptTemplate {
    pub fn name(&self) -> &'static str {
        match self {
            PromptTemplate::Default => "default",
            PromptTemplate::Talky => "talky",
            PromptTemplate::TalkyNoImg => "talky_no_img",
            PromptTemplate::DemoTalkyNoImg => "demo_talky_no_img",
            PromptTemplate::Debug => "debug",
        }
    }
}

impl FromStr for PromptTemplate {
    type Err = PromptError;

    /// An unrecognized selector is an error, not an empty prompt.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "default" => Ok(PromptTemplate::Default),
            "talky" => Ok(PromptTemplate::Talky),
            "talky_no_img" => Ok(PromptTemplate::TalkyNoImg),
            "demo_talky_no_img" => Ok(PromptTemplate::DemoTalkyNoImg),
            "debug" => Ok(PromptTemplate::Debug),
            other => Err(PromptError::UnsupportedTemplate(other.to_string())),
        }
    }
}

/// Everything a template may interpolate.
#[derive(Debug, Clone)]
pub struct PromptInputs<'a> {
    /// The companion's spoken name.
    pub bot_name: &'a str,
    /// Serialized memory blob (stable key order).
    pub memory_json: &'a str,
    /// The three topic labels of the active theme, in display order.
    pub topics: &'a [String; 3],
    /// Formatted prior-session context, when any sessions exist.
    pub prior_summaries: Option<&'a str>,
    /// The active theme id, when one is selected.
    pub theme_id: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    MemoryReference,
    WarmUp,
    TopicSelection,
    SafetyCheck,
    SessionClosing,
}

/// The section table. Order within each row is the concatenation order.
/// The match is exhaustive so a new variant cannot ship unhandled.
fn sections_for(template: PromptTemplate) -> &'static [Section] {
    match template {
        PromptTemplate::Default => &[
            Section::MemoryReference,
            Section::WarmUp,
            Section::TopicSelection,
            Section::SafetyCheck,
        ],
        PromptTemplate::Talky => &[
            Section::WarmUp,
            Section::TopicSelection,
            Section::SafetyCheck,
        ],
        PromptTemplate::TalkyNoImg => &[Section::WarmUp, Section::SafetyCheck],
        PromptTemplate::DemoTalkyNoImg => &[Section::WarmUp],
        PromptTemplate::Debug => &[Section::TopicSelection],
    }
}

/// Builds the instruction string for a template. Pure; no I/O.
pub fn build_instructions(template: PromptTemplate, inputs: &PromptInputs<'_>) -> String {
    let mut out = identity_section(inputs);
    for section in sections_for(template) {
        out.push('\n');
        out.push_str(&match section {
            Section::MemoryReference => memory_reference_section(inputs),
            Section::WarmUp => warm_up_section(inputs),
            Section::TopicSelection => topic_selection_section(inputs),
            Section::SafetyCheck => safety_check_section(),
            Section::SessionClosing => session_closing_section(),
        });
    }
    out
}

/// The wind-down instructions applied once the session has run long enough.
pub fn closing_instructions() -> String {
    session_closing_section()
}

fn identity_section(inputs: &PromptInputs<'_>) -> String {
    format!(
        "[Identity]\n\
         You are {name}, a companion trained in reminiscence therapy, speaking with an older adult \
         who may have mild cognitive impairment or may be cognitively normal. Lead a warm, \
         empathetic conversation that helps them recall and share their memories.\n\
         \n\
         [Style]\n\
         - Be concise: address one topic at most per reply.\n\
         - Ask only ONE question at a time, and wait for the answer.\n\
         - Use everyday language, like talking to a friend.\n\
         - If an answer is vague or partial, gently ask again for clarity.\n\
         - Transcripts may contain transcription errors; guess the intent and never mention them.\n\
         - Give the participant ample time to think; never rush or interrupt.\n",
        name = inputs.bot_name
    )
}

fn memory_reference_section(inputs: &PromptInputs<'_>) -> String {
    let previous = match inputs.prior_summaries {
        Some(context) => context.to_string(),
        None => "No summaries from previous sessions are available.".to_string(),
    };
    format!(
        "[User memory]\n\
         Facts recorded in earlier conversations. Reference them naturally; never read the raw data aloud.\n\
         {memory}\n\
         \n\
         [Previous sessions]\n\
         {previous}\n",
        memory = inputs.memory_json,
        previous = previous,
    )
}

fn warm_up_section(inputs: &PromptInputs<'_>) -> String {
    format!(
        "[Warm-up]\n\
         1. Greet the participant warmly. If you do not know their name, gently ask for it, then \
         call the record_memory_fact function with key 'name' to save it.\n\
         2. If user memory is present, warm up by referencing the last conversation; otherwise do \
         a few rounds of warm-up small talk.\n\
         3. Whenever the participant shares a durable fact about themselves, save it with \
         record_memory_fact (lowercase snake_case keys).\n\
         Remember: you are {name}; introduce yourself by that name.\n",
        name = inputs.bot_name
    )
}

fn topic_selection_section(inputs: &PromptInputs<'_>) -> String {
    let theme_line = match inputs.theme_id {
        Some(id) => format!(
            "The topic images belong to theme {id}; mention that the pictures are on the screen.\n"
        ),
        None => String::new(),
    };
    format!(
        "[Topic selection]\n\
         1. Call the reveal_topic_images function to display the three topic images, and tell the \
         participant to look at the screen.\n\
         2. Ask them to choose one of: (1) {t1}, (2) {t2}, or (3) {t3}.\n\
         3. When they decide, call the select_topic function with the topic's id ('1', '2' or '3'); \
         the screen then shows only that picture.\n\
         4. Ask: \"What can you see in the picture?\" and patiently guide them to describe details.\n\
         5. Keep discussing the topic with small hints that help them recall their own past, \
         without over-explaining.\n\
         {theme_line}",
        t1 = inputs.topics[0],
        t2 = inputs.topics[1],
        t3 = inputs.topics[2],
        theme_line = theme_line,
    )
}

fn safety_check_section() -> String {
    "[Safety check]\n\
     Distressing emotions are a normal part of reminiscence; tolerate them as a therapist would. \
     If the participant mentions symptoms consistent with psychosis, mania, self-injury, or \
     thoughts of suicide: acknowledge with empathy, ask them to rate the severity out of 10, and \
     assess risk directly but sensitively. If they report a plan or intent, tell them to seek \
     professional help immediately or call 911, explain that this platform cannot provide the \
     needed level of support, and end the conversation. Never minimize what they share.\n"
        .to_string()
}

fn session_closing_section() -> String {
    "[Session closing]\n\
     The conversation has lasted long enough. Wind down smoothly: if the participant is still \
     sharing, let them finish, but do not start a new topic or ask new questions. Reflect back \
     what they explored today and congratulate them on taking the time. Offer a gentle goodbye, \
     for example: \"It has been so enjoyable to talk with you. Would you like to take a break?\"\n"
        .to_string()
}
