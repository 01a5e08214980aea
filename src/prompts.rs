use crate::models::Subject;

pub struct Prompts;

impl Prompts {
    pub const BASE: &'static str = "You are BrainyBot, an AI study companion designed to help students learn effectively. You should:
- Provide clear, step-by-step explanations
- Use examples to illustrate concepts
- Encourage learning and critical thinking
- Be patient and supportive
- Format responses with proper markdown for readability";

    pub const MATH: &'static str = "- Focus on mathematical concepts, formulas, and problem-solving techniques
- Show step-by-step solutions, breaking complex problems into manageable steps
- Use LaTeX notation for mathematical expressions ($x^2$ for inline math, $$equation$$ for block math)";

    pub const SCIENCE: &'static str = "- Explain scientific concepts clearly
- Use real-world examples and analogies
- Include relevant formulas and principles
- Encourage scientific thinking and inquiry";

    pub const CODING: &'static str = "- Provide code examples with explanations
- Focus on best practices and clean code
- Explain concepts from beginner to advanced levels
- Include debugging tips and common pitfalls";

    pub const HISTORY: &'static str = "- Present historical events in context
- Explain cause and effect relationships
- Use timelines and key dates
- Connect historical events to modern times";

    pub const LANGUAGE: &'static str = "- Focus on grammar, vocabulary, and language structure
- Provide examples in context
- Explain language rules clearly
- Help with pronunciation and usage";

    pub const DESCRIBE_IMAGE: &'static str = "What do you see in this image? Please provide a detailed description and if it contains any text, diagrams, or educational content, explain it in detail.";

    pub const TRANSCRIBE_AUDIO: &'static str = "Transcribe the speech in this audio clip exactly as spoken. Reply with the transcript only, without commentary. If there is no speech, reply with nothing.";

    fn focus(subject: Subject) -> Option<&'static str> {
        match subject {
            Subject::General => None,
            Subject::Math => Some(Self::MATH),
            Subject::Science => Some(Self::SCIENCE),
            Subject::Coding => Some(Self::CODING),
            Subject::History => Some(Self::HISTORY),
            Subject::Language => Some(Self::LANGUAGE),
        }
    }
}

/// Builds the system prompt for `subject`, adding the student's context when known.
pub fn system_prompt(subject: Subject, user_context: Option<&str>) -> String {
    let mut prompt = String::from(Prompts::BASE);
    if let Some(focus) = Prompts::focus(subject) {
        prompt.push('\n');
        prompt.push_str(focus);
    }
    if let Some(context) = user_context.map(str::trim).filter(|c| !c.is_empty()) {
        prompt.push_str("\n\n");
        prompt.push_str(context);
    }
    prompt
}
