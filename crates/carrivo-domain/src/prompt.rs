//! Prompt construction for contextualization and answer generation.

use carrivo_llm::{CompletionRequest, Message};
use carrivo_session::{Turn, TurnRole};

use crate::assembler::ContextBlock;
use crate::language::Language;

/// Turns of history replayed into each prompt.
pub const PROMPT_HISTORY_TURNS: usize = 2;

const SYSTEM_PROMPT_AR_EG: &str = "\
انت \"Carrivo Assistant\"، مساعد مصري بيساعد الطلبة والخريجين يختاروا طريقهم في التكنولوجيا والبرمجة.

- اتكلم عامية مصرية محترمة وخلي ردك مباشر، 2 لـ 4 سطور إلا لو اتطلب منك شرح بالتفصيل.
- اكتب المصطلحات التقنية بالإنجليزي زي ما هي (Backend, Frontend, DevOps).
- اعتمد على المعلومات اللي في الـ Context. لو مفيش Context، جاوب من معرفتك العامة من غير ما تقول إن عندك مصدر.
- ممنوع تألف أي لينك. استخدم بس اللينكات اللي في الـ Context، ولو مفيش قول إن المصدر مش متوفر.
- لو حد طلب roadmap، ادي اللينك في أول الرد.
- متكررش كلام قلته قبل كده، وكمل من آخر نقطة في المحادثة.
- لو السؤال بره التعليم والبرمجة والشغل، اعتذر بلطف ورجع الكلام لمسار المستخدم المهني.";

const SYSTEM_PROMPT_AR: &str = "\
أنت \"Carrivo Assistant\"، مساعد يساعد الطلاب والخريجين على اختيار مسارهم في مجال التقنية والبرمجة.

- استخدم العربية الفصحى الواضحة، واجعل الإجابة مباشرة في سطرين إلى أربعة أسطر ما لم يُطلب شرح مفصل.
- اكتب المصطلحات التقنية بالإنجليزية كما هي.
- اعتمد على المعلومات الواردة في السياق. إذا لم يوجد سياق فأجب من معرفتك العامة دون الادعاء بوجود مصدر.
- يُمنع تأليف أي رابط. استخدم الروابط الموجودة في السياق فقط، وإن لم توجد فاذكر أن المصدر غير متوفر.
- عند طلب roadmap، ضع الرابط في بداية الإجابة.
- لا تكرر ما قلته سابقاً، وتابع من آخر نقطة في المحادثة.
- إذا كان السؤال خارج التعليم والبرمجة والعمل، فاعتذر بلطف وأعد الحديث إلى المسار المهني للمستخدم.";

const SYSTEM_PROMPT_EN: &str = "\
You are \"Carrivo Assistant\", helping students and graduates choose their path in technology and programming.

- Be friendly and direct. Reply in 2-4 lines unless the user asks for a detailed explanation.
- Ground your answer in the provided Context. Without Context, answer from general knowledge and never claim a source.
- Never invent links. Use only links that appear in the Context; if there are none, say the resource is not available.
- When asked for a roadmap, give its link first.
- Do not repeat what you already said; continue from the latest point in the conversation.
- If the question is outside education, programming and careers, politely decline and steer back to the user's career.";

/// System prompt for the reply language.
pub fn system_prompt(language: Language) -> &'static str {
    match language {
        Language::En => SYSTEM_PROMPT_EN,
        Language::Ar => SYSTEM_PROMPT_AR,
        Language::ArEg | Language::Mixed | Language::Unknown => SYSTEM_PROMPT_AR_EG,
    }
}

/// Link instruction appended after the context.
pub fn link_instruction(urls: &[String]) -> String {
    if urls.is_empty() {
        return "NO LINKS AVAILABLE: do not include any links in your answer.".to_string();
    }
    let list: Vec<String> = urls.iter().map(|u| format!("  - {u}")).collect();
    format!(
        "AVAILABLE LINKS (use only these):\n{}\nDo not create or suggest any other links.",
        list.join("\n")
    )
}

/// Parameters for one answer generation.
#[derive(Debug, Clone)]
pub struct GenerationParams {
    /// Empty means the backend's configured model.
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            model: String::new(),
            temperature: 0.7,
            max_tokens: 800,
        }
    }
}

/// Build the answer request: system prompt, last history turns, then the
/// user message wrapped with its context and link instruction.
pub fn build_generation_request(
    message: &str,
    block: Option<&ContextBlock>,
    history: &[Turn],
    language: Language,
    params: &GenerationParams,
) -> CompletionRequest {
    let mut messages = history_messages(history);

    let context = block.map(|b| b.text.as_str()).unwrap_or("None");
    let urls = block.map(|b| b.urls.as_slice()).unwrap_or(&[]);
    messages.push(Message::user(format!(
        "Context:\n{context}\n\n{}\n\nQuestion: {message}\n\nAnswer:",
        link_instruction(urls)
    )));

    CompletionRequest::new(params.model.clone(), messages, params.max_tokens)
        .with_system(system_prompt(language))
        .with_temperature(params.temperature)
}

/// Build the request that rewrites a follow-up into a standalone query.
pub fn build_contextualize_request(
    message: &str,
    history: &[Turn],
    model: &str,
    max_tokens: u32,
    temperature: f32,
) -> CompletionRequest {
    let transcript: String = last_turns(history)
        .iter()
        .map(|turn| {
            let speaker = match turn.role {
                TurnRole::User => "User",
                TurnRole::Assistant => "Assistant",
            };
            format!("{speaker}: {}\n", turn.text)
        })
        .collect();

    let prompt = format!(
        "Conversation history:\n{transcript}\n\
         Follow-up input: \"{message}\"\n\n\
         Rewrite the follow-up input as a standalone semantic search query that names the \
         specific topic from the history. If it is already clear, return it unchanged. \
         Replace references such as \"it\" or \"this\" with the actual subject. \
         Keep the language of the input. Return only the query.\n\n\
         Standalone query:"
    );

    CompletionRequest::new(model, vec![Message::user(prompt)], max_tokens).with_temperature(temperature)
}

fn last_turns(history: &[Turn]) -> &[Turn] {
    &history[history.len().saturating_sub(PROMPT_HISTORY_TURNS)..]
}

fn history_messages(history: &[Turn]) -> Vec<Message> {
    last_turns(history)
        .iter()
        .map(|turn| match turn.role {
            TurnRole::User => Message::user(turn.text.clone()),
            TurnRole::Assistant => Message::assistant(turn.text.clone()),
        })
        .collect()
}
