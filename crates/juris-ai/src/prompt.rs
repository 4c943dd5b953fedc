//! System prompt construction
//!
//! The prompt is pure template text selected by the conversation mode and
//! the response level, followed by the widget-tag instructions, the legal
//! references spotted in the user's question and any attached file text.

use crate::types::{ChatMode, ChatRequest, ResponseLevel};
use regex::Regex;
use std::sync::LazyLock;

/// Attached file text beyond this many characters is cut off
pub const MAX_FILE_CONTEXT_CHARS: usize = 30_000;

/// At most this many detected references are listed in the prompt
pub const MAX_REFERENCES: usize = 10;

static LEGAL_CITATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i:\bart(?:igo)?s?\.?\s*\d+(?:\.\d+)*(?:º|°|o)?(?:-[a-z])?)",
        r"|(?i:\blei\s+(?:complementar\s+)?(?:n[º°o]?\.?\s*)?\d+(?:\.\d+)*(?:/\d{2,4})?)",
        r"|(?i:\bs[úu]mula\s+(?:vinculante\s+)?(?:n[º°o]?\.?\s*)?\d+)",
        r"|\b(?:CF|CPP|CPC|CP|CC|CLT|CDC|ECA|CTN)\b",
    ))
    .expect("invalid legal citation regex")
});

/// Pattern matching article, statute, súmula and code citations.
///
/// Shared with the display metrics so both sides count the same thing.
pub fn legal_citation_pattern() -> &'static Regex {
    &LEGAL_CITATION
}

/// Legal references mentioned in `text`, in order of first appearance,
/// deduplicated and capped at [`MAX_REFERENCES`]
pub fn detect_legal_references(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for m in LEGAL_CITATION.find_iter(text) {
        let reference = m.as_str().split_whitespace().collect::<Vec<_>>().join(" ");
        if !found.iter().any(|f| f.eq_ignore_ascii_case(&reference)) {
            found.push(reference);
        }
        if found.len() == MAX_REFERENCES {
            break;
        }
    }
    found
}

/// Everything the system prompt depends on
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PromptInput {
    pub mode: ChatMode,
    pub level: ResponseLevel,
    pub references: Vec<String>,
    pub file_text: Option<String>,
}

impl PromptInput {
    /// Gather prompt inputs from an incoming chat request
    pub fn from_request(request: &ChatRequest) -> Self {
        Self {
            mode: request.chat_mode(),
            level: request.effective_level(),
            references: request
                .last_user_text()
                .map(detect_legal_references)
                .unwrap_or_default(),
            file_text: request.attached_text(),
        }
    }
}

/// Build the system prompt
pub fn build_system_prompt(input: &PromptInput) -> String {
    let mut prompt = String::from(
        "Você é a Professora Jurídica, uma assistente de estudos de Direito brasileiro. \
         Responda sempre em português do Brasil, com precisão técnica e citando a legislação \
         e a jurisprudência pertinentes.\n\n",
    );

    prompt.push_str(mode_template(input.mode));
    prompt.push_str("\n\n");
    prompt.push_str(level_clause(input.level));
    prompt.push_str("\n\n");
    prompt.push_str(WIDGET_INSTRUCTIONS);

    if !input.references.is_empty() {
        prompt.push_str("\n\n## Referências mencionadas pelo aluno\n");
        for reference in &input.references {
            prompt.push_str("- ");
            prompt.push_str(reference);
            prompt.push('\n');
        }
        prompt.push_str("Explique cada uma delas no contexto da pergunta.");
    }

    if let Some(text) = input.file_text.as_deref().filter(|t| !t.trim().is_empty()) {
        prompt.push_str("\n\n## Documento anexado\n");
        prompt.push_str("Use o conteúdo abaixo como base principal da resposta.\n\n");
        let (excerpt, truncated) = truncate_chars(text, MAX_FILE_CONTEXT_CHARS);
        prompt.push_str(excerpt);
        if truncated {
            prompt.push_str("\n\n[... conteúdo truncado ...]");
        }
    }

    prompt
}

fn mode_template(mode: ChatMode) -> &'static str {
    match mode {
        ChatMode::Chat => {
            "Converse de forma didática e acolhedora. Responda à dúvida do aluno de modo direto \
             e ofereça aprofundamento quando fizer sentido."
        }
        ChatMode::Study => {
            "Modo estudo: organize a resposta em conceito, fundamento legal, doutrina, \
             jurisprudência e um exemplo prático. Termine com pontos-chave para revisão."
        }
        ChatMode::Lesson => {
            "Modo aula: estruture o conteúdo como uma aula, com introdução, tópicos numerados \
             com títulos em markdown (##), exemplos e um resumo final com exercícios de fixação."
        }
        ChatMode::Analysis => {
            "Modo análise de documento: identifique o tipo de peça, as partes, os pedidos, os \
             fundamentos jurídicos e eventuais vícios. Aponte riscos e sugestões de melhoria."
        }
        ChatMode::Recommendation => {
            "Modo recomendação: sugira um roteiro de estudo com artigos de lei, súmulas e temas \
             prioritários, em ordem de relevância para provas e concursos."
        }
        ChatMode::Simulation => {
            "Modo simulação: conduza um júri simulado. Apresente o caso, os argumentos da \
             acusação e da defesa e peça ao aluno que decida, comentando a decisão depois."
        }
    }
}

fn level_clause(level: ResponseLevel) -> &'static str {
    match level {
        ResponseLevel::Basic => {
            "Nível básico: resposta curta e objetiva, em linguagem simples, sem widgets."
        }
        ResponseLevel::Complete => {
            "Nível completo: resposta estruturada com títulos, fundamentação e exemplos. \
             Use widgets quando ajudarem a visualizar o conteúdo."
        }
        ResponseLevel::Deep => {
            "Nível aprofundado: análise extensa, com correntes doutrinárias divergentes, \
             precedentes dos tribunais superiores e casos práticos. Use widgets sempre que útil."
        }
    }
}

const WIDGET_INSTRUCTIONS: &str = r#"## Widgets visuais
Você pode incluir blocos visuais usando tags entre colchetes. Cada bloco abre com [TAG] ou [TAG: Título], traz um JSON válido e fecha com [/TAG]. Nunca deixe um bloco sem a tag de fechamento.

[COMPARAÇÃO: Título]{"cards":[{"title":"...","content":"..."}]}[/COMPARAÇÃO]
[CARROSSEL: Título]{"cards":[{"title":"...","content":"..."}]}[/CARROSSEL]
[INFOGRÁFICO: Título]{"items":[{"title":"...","content":"...","icon":"⚖️"}]}[/INFOGRÁFICO]
[ESTATÍSTICAS: Título]{"stats":[{"value":"...","label":"..."}]}[/ESTATÍSTICAS]
[PASSO-A-PASSO: Título]{"steps":[{"title":"...","content":"..."}]}[/PASSO-A-PASSO]
[ABAS: Título]{"tabs":[{"title":"...","content":"..."}]}[/ABAS]
[ACORDEÃO: Título]{"items":[{"title":"...","content":"..."}]}[/ACORDEÃO]
[SLIDES: Título]{"slides":[{"title":"...","content":"..."}]}[/SLIDES]

Destaques curtos, sem JSON:
[ATENÇÃO]texto[/ATENÇÃO] [DICA]texto[/DICA] [IMPORTANTE]texto[/IMPORTANTE] [NOTA]texto[/NOTA] [EXEMPLO]texto[/EXEMPLO]"#;

/// Cut `text` to at most `max` characters on a char boundary
fn truncate_chars(text: &str, max: usize) -> (&str, bool) {
    match text.char_indices().nth(max) {
        Some((byte_idx, _)) => (&text[..byte_idx], true),
        None => (text, false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::WireMessage;

    #[test]
    fn test_detect_references_in_order() {
        let refs = detect_legal_references(
            "O art. 121 do CP e a Lei nº 8.078/90 se aplicam? Veja a Súmula Vinculante 13 e o artigo 5º da CF.",
        );
        assert_eq!(
            refs,
            vec!["art. 121", "CP", "Lei nº 8.078/90", "Súmula Vinculante 13", "artigo 5º", "CF"]
        );
    }

    #[test]
    fn test_detect_references_dedup_and_cap() {
        let text = (1..=20).map(|n| format!("art. {n} ")).collect::<String>() + "art. 1";
        let refs = detect_legal_references(&text);
        assert_eq!(refs.len(), MAX_REFERENCES);
        assert_eq!(refs[0], "art. 1");

        let refs = detect_legal_references("CPC, CPC e cpc");
        assert_eq!(refs, vec!["CPC"]);
    }

    #[test]
    fn test_no_false_positives_in_plain_words() {
        assert!(detect_legal_references("a arte de partir o bolo com cuidado").is_empty());
    }

    #[test]
    fn test_prompt_selects_mode_and_level() {
        let input = PromptInput {
            mode: ChatMode::Study,
            level: ResponseLevel::Basic,
            ..Default::default()
        };
        let prompt = build_system_prompt(&input);
        assert!(prompt.contains("Modo estudo"));
        assert!(prompt.contains("Nível básico"));
        assert!(!prompt.contains("Modo aula"));
        assert!(prompt.contains("[COMPARAÇÃO: Título]"));
        assert!(!prompt.contains("Documento anexado"));
    }

    #[test]
    fn test_prompt_is_pure() {
        let input = PromptInput {
            mode: ChatMode::Lesson,
            level: ResponseLevel::Deep,
            references: vec!["art. 5º".to_string()],
            file_text: Some("conteúdo".to_string()),
        };
        assert_eq!(build_system_prompt(&input), build_system_prompt(&input));
    }

    #[test]
    fn test_file_text_is_truncated_on_char_boundary() {
        let baseline = build_system_prompt(&PromptInput::default()).matches('ç').count();
        let text = "ç".repeat(MAX_FILE_CONTEXT_CHARS + 5);
        let input = PromptInput {
            file_text: Some(text),
            ..Default::default()
        };
        let prompt = build_system_prompt(&input);
        assert!(prompt.contains("conteúdo truncado"));
        assert_eq!(prompt.matches('ç').count(), baseline + MAX_FILE_CONTEXT_CHARS);
    }

    #[test]
    fn test_from_request_uses_last_user_message() {
        let request = ChatRequest {
            messages: vec![
                WireMessage::user("fale do art. 157"),
                WireMessage::assistant("ok"),
                WireMessage::user("e a Súmula 473?"),
            ],
            mode: "analysis".to_string(),
            deep_mode: Some(true),
            ..Default::default()
        };
        let input = PromptInput::from_request(&request);
        assert_eq!(input.mode, ChatMode::Analysis);
        assert_eq!(input.level, ResponseLevel::Deep);
        assert_eq!(input.references, vec!["Súmula 473"]);
        assert!(input.file_text.is_none());
    }
}
