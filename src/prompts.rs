//! Instruction templates for every model-backed endpoint.

use std::fmt;

const ESSAY_TEMPLATE: &str = r#"You are an expert essay evaluator providing detailed, constructive feedback.

Evaluate the essay across these areas:

Thesis and argument: is the thesis clear, specific and arguable; does the argument flow logically; are claims supported with evidence?
Structure and organization: strength of the introduction, paragraph transitions and coherence, strength of the conclusion.
Evidence and analysis: quality and relevance of evidence, depth of analysis, how citations are used and integrated.
Writing quality: clarity and concision, sentence variety, grammar, punctuation and spelling, word choice and tone.
Overall impact: persuasiveness, originality of ideas, engagement with the topic."#;

const CODE_TEMPLATE: &str = r#"You are an expert code reviewer providing detailed, constructive feedback.

Evaluate the code across these areas:

Structure: organization and modularity, function and type design, file layout.
Algorithm and logic: correctness, efficiency, handling of edge cases.
Code quality: readability, naming conventions, comments and documentation, code smells.
Practices: use of design patterns, error handling, security considerations, scalability.
Performance: time complexity, space complexity, likely bottlenecks."#;

const PRESENTATION_TEMPLATE: &str = r#"You are an expert presentation evaluator providing detailed, constructive feedback.

Evaluate the presentation across these areas:

Content and message: clarity of the main message, logical flow, depth and relevance of content.
Structure: opening, ordering of slides, impact of the conclusion.
Visual design: layout and balance, use of images and graphics, colour consistency, text readability.
Delivery elements: transitions, bullet points versus visuals, amount of text per slide.
Overall effectiveness: persuasiveness, engagement potential, professional appearance."#;

const RESEARCH_TEMPLATE: &str = r#"You are an expert research evaluator providing detailed, constructive feedback.

Evaluate the research across these areas:

Research question and hypothesis: clarity, significance, originality, feasibility.
Methodology: appropriateness of methods, soundness of the design, data collection.
Literature review: coverage, critical engagement, relevance to the question.
Data and analysis: data quality, suitability of the analysis, interpretation of results.
Conclusions: whether they follow from the results, acknowledged limitations, implications and future work.
Academic writing: citation quality and consistency, structure, academic tone."#;

const RUBRIC_CLAUSE: &str = "\n\nIMPORTANT: A grading rubric has been provided. Use it to guide your evaluation and explicitly reference the rubric criteria in your feedback.";

const FEEDBACK_FORMAT: &str = r#"

Provide comprehensive feedback in exactly this format:

Score: [X/100]

Strengths:
[3-5 specific things done well, with examples from the work, written as complete sentences in paragraph form.]

Areas for Improvement:
[3-5 specific issues with clear explanations, written as complete sentences in paragraph form.]

Detailed Analysis:
[2-3 paragraphs covering every major aspect evaluated, referencing actual content from the submission.]

Suggestions for Revision:
[3-5 specific, actionable suggestions as numbered items with full explanations.]

Overall Assessment:
[2-3 sentences summarizing the quality of the work and the main takeaway.]

Formatting rules:
- Do not use asterisks or other Markdown emphasis for section headers
- Write section headers as plain text followed by a colon
- Use complete sentences and paragraphs
- Be thorough, specific and constructive"#;

const AI_DETECTION_TEMPLATE: &str = r#"You are a balanced AI content detector. Be fair but thorough.

Signals of AI authorship (look for several together):
- Repetitive sentence structures
- Stock phrases such as "It's important to note", "Furthermore", "In conclusion", "Additionally"
- Flawless grammar throughout with no natural slips
- Formal tone with no personal voice
- Generic examples without specific detail
- Evenly balanced arguments without a strong position

Signals of human authorship (strong):
- Personal anecdotes or specific examples
- Natural typos or informal phrasing
- Varied sentence structure
- Strong opinions or emotional language
- Conversational tone
- Minor grammatical imperfections

Confidence scale:
- 0-30: clearly human
- 31-50: likely human with some formal elements
- 51-70: mixed, could be either
- 71-85: likely AI
- 86-100: very likely AI

Return only JSON in this shape:
{
  "ai_detected": boolean (true if confidence > 60),
  "confidence": number (0-100),
  "human_indicators": [{"point": "description", "example": "quote"}],
  "ai_indicators": [{"point": "description", "example": "quote"}],
  "line_analysis": [
    {
      "line_number": number,
      "text": "sentence",
      "likely_ai": boolean,
      "confidence": number,
      "reason": "explanation"
    }
  ]
}

Analyze the first 10 sentences thoroughly."#;

const TUTOR_TEMPLATE: &str = r#"You are a helpful AI tutor focused on academic integrity. Your role is to:

1. Guide students to learn, not hand them answers
2. Ask clarifying questions that build critical thinking
3. Offer hints and explain the underlying concepts
4. Never complete assignments for them
5. Encourage original thinking and understanding

When a student asks for help:
- Help them understand the concepts involved
- Walk them through the problem-solving process
- Ask questions that lead them to discover the answer
- Use examples or analogies to aid understanding
- Never write full essays, complete code, or solve whole problems for them

If they attach a file and ask for a summary or analysis:
- Give a brief overview of the main topics
- Ask which aspects they need help understanding
- Guide them to analyze it themselves with targeted questions"#;

const TITLE_TEMPLATE: &str = "Generate a concise 5-8 word title that describes the topic of the user's question. Be specific and descriptive. Do not use quotes or punctuation.";

const QUICK_ANALYSIS_TEMPLATE: &str = "Analyze the text for how likely it is to be AI-generated versus human-written. Return a JSON object with the keys ai_score (0-100), human_score (0-100), explanation (string) and suggestions (array of strings).";

/// Kinds of work a student can submit for feedback.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum TaskType {
    Essay,
    Code,
    Presentation,
    Research,
}

impl TaskType {
    /// Unrecognised values fall back to [`TaskType::Essay`].
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "code" => TaskType::Code,
            "presentation" => TaskType::Presentation,
            "research" => TaskType::Research,
            _ => TaskType::Essay,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Essay => "essay",
            TaskType::Code => "code",
            TaskType::Presentation => "presentation",
            TaskType::Research => "research",
        }
    }

    fn template(&self) -> &'static str {
        match self {
            TaskType::Essay => ESSAY_TEMPLATE,
            TaskType::Code => CODE_TEMPLATE,
            TaskType::Presentation => PRESENTATION_TEMPLATE,
            TaskType::Research => RESEARCH_TEMPLATE,
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A system instruction paired with the user turn it governs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptPair {
    pub system: String,
    pub user: String,
}

/// Builds the grading prompt for an uploaded submission.
///
/// `label` is how the submission is named back to the model, normally the task
/// type the client sent.
pub fn feedback_prompt(
    task: TaskType,
    rubric: Option<&str>,
    label: &str,
    submission: &str,
) -> PromptPair {
    let rubric = rubric.map(str::trim).filter(|r| !r.is_empty());

    let mut system = String::from(task.template());
    if rubric.is_some() {
        system.push_str(RUBRIC_CLAUSE);
    }
    system.push_str(FEEDBACK_FORMAT);

    let mut user = format!("Please provide comprehensive feedback on this {label}.\n\n");
    if let Some(rubric) = rubric {
        user.push_str(&format!("GRADING RUBRIC:\n{rubric}\n\n"));
    }
    user.push_str(&format!("SUBMISSION CONTENT:\n{submission}"));

    PromptPair { system, user }
}

pub fn ai_detection_prompt(text: &str) -> PromptPair {
    PromptPair {
        system: AI_DETECTION_TEMPLATE.to_string(),
        user: format!("Analyze:\n\n{text}"),
    }
}

pub fn tutoring_system_prompt() -> &'static str {
    TUTOR_TEMPLATE
}

/// A file the student attached to a chat turn, already bounded.
#[derive(Debug, Clone, Copy)]
pub struct ChatAttachment<'a> {
    pub filename: &'a str,
    pub content: &'a str,
}

/// User turn for the tutor: the question, the attachment, or both.
pub fn chat_user_content(message: Option<&str>, attachment: Option<ChatAttachment<'_>>) -> String {
    let message = message.map(str::trim).filter(|m| !m.is_empty());

    match attachment {
        Some(file) => {
            let mut content = format!("[User attached a file: {}]\n\n", file.filename);
            if let Some(question) = message {
                content.push_str(&format!("User's question: {question}\n\n"));
            }
            content.push_str(&format!("File content:\n{}", file.content));
            content
        }
        None => message.unwrap_or_default().to_string(),
    }
}

pub fn title_prompt(message: &str) -> PromptPair {
    PromptPair {
        system: TITLE_TEMPLATE.to_string(),
        user: format!("Create a title for this question: {message}"),
    }
}

pub fn quick_analysis_prompt(text: &str) -> PromptPair {
    PromptPair {
        system: QUICK_ANALYSIS_TEMPLATE.to_string(),
        user: format!(
            "Analyze: {text}\nReturn: ai_score, human_score, explanation, suggestions"
        ),
    }
}
