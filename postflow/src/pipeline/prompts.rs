//! Prompt builders for the text and media stages.

use std::fmt::Write as _;

use super::run_context::RunContext;

fn notes(ctx: &RunContext) -> String {
    let mut out = String::new();
    for (key, value) in &ctx.input.params {
        let _ = write!(out, "\n{key}: {value}");
    }
    if let Some(instructions) = ctx.instructions.as_deref() {
        let _ = write!(out, "\nReviewer notes: {instructions}");
    }
    out
}

pub(crate) fn topic(ctx: &RunContext) -> String {
    let hint = ctx
        .input
        .topic_hint
        .as_deref()
        .map(|h| format!(" Start from this idea: {h}."))
        .unwrap_or_default();
    format!(
        "Suggest one topic for a short {} social media post.{hint} \
         Answer with the topic only, on a single line.{}",
        ctx.recipe,
        notes(ctx)
    )
}

pub(crate) fn caption(ctx: &RunContext, topic: &str) -> String {
    format!(
        "Write an engaging caption about \"{topic}\" for {}. \
         Open with a hook, end with a call to action, add a few hashtags.{}",
        ctx.platforms.join(", "),
        notes(ctx)
    )
}

pub(crate) fn narration(ctx: &RunContext, topic: &str, seconds: f64, words: usize) -> String {
    format!(
        "Write a voice-over script about \"{topic}\" lasting {seconds:.0} seconds \
         (about {words} words). The first sentence is the hook, the last sentence \
         is the call to action. Plain sentences only, no stage directions.{}",
        notes(ctx)
    )
}

pub(crate) fn dialog(ctx: &RunContext, topic: &str, seconds: f64, words: usize) -> String {
    format!(
        "Write one line a presenter says on camera about \"{topic}\". \
         It must fit in {seconds:.0} seconds (at most {words} words).{}",
        notes(ctx)
    )
}

pub(crate) fn image(ctx: &RunContext, topic: &str, caption: &str) -> String {
    let mut prompt = format!("Eye-catching social media image about {topic}. Mood: {}", first_line(caption).unwrap_or_default());
    if let Some(instructions) = ctx.instructions.as_deref() {
        let _ = write!(prompt, ". {instructions}");
    }
    prompt
}

pub(crate) fn dialog_clip(topic: &str, line: &str) -> String {
    format!("Presenter speaking to camera about {topic}, saying: \"{line}\"")
}

pub(crate) fn b_roll(topic: &str) -> String {
    format!("Cinematic B-roll footage of {topic}, no people talking")
}

/// First non-empty line, trimmed of whitespace and quotes.
pub(crate) fn first_line(text: &str) -> Option<String> {
    text.lines()
        .map(|l| l.trim().trim_matches(&['"', '\''][..]).trim())
        .find(|l| !l.is_empty())
        .map(str::to_string)
}

/// Whole text trimmed, or `None` when nothing is left.
pub(crate) fn non_empty(text: &str) -> Option<String> {
    let trimmed = text.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}
