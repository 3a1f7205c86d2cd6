//! Line-oriented protocol for driving the bot from an external controller.
//!
//! Input lines carry recognized speech as `RECOG_EVENT_STOP|<utterance>`;
//! replies go out as `SYNTH_START|0|<voice>|<reply>`. Anything else on stdin
//! (including empty utterances) is ignored.

const INPUT_PREFIX: &str = "RECOG_EVENT_STOP|";
const OUTPUT_VOICE: &str = "mei_voice_normal";

/// Extracts the user utterance from one input line, or `None` when the line
/// is malformed or carries no text.
pub fn parse_input(line: &str) -> Option<&str> {
    let utterance = line.trim().strip_prefix(INPUT_PREFIX)?;
    if utterance.is_empty() {
        return None;
    }
    Some(utterance)
}

/// Formats one synthesized reply for the output stream.
pub fn format_output(reply: &str) -> String {
    format!("SYNTH_START|0|{}|{}", OUTPUT_VOICE, reply)
}
