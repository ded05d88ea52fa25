use pulldown_cmark::{CodeBlockKind, Event, Options, Parser, Tag, html};
use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum RenderError {
    #[snafu(display("markdown rendering failed on `{stage}`: {details}"))]
    Markdown { stage: &'static str, details: String },
}

/// Markdown-to-HTML collaborator called on every chunk and again on finalize.
pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, text: &str) -> Result<String, RenderError>;
}

/// What the surface should display for one message body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderedContent {
    Html { html: String, source: String },
    Plain(String),
}

impl RenderedContent {
    /// Renders through `renderer`, falling back to plain text when it is absent or fails.
    pub fn render(renderer: Option<&dyn MarkdownRenderer>, text: &str) -> Self {
        let Some(renderer) = renderer else {
            return Self::Plain(text.to_string());
        };

        match renderer.render(text) {
            Ok(html) => Self::Html {
                html,
                source: text.to_string(),
            },
            Err(error) => {
                tracing::warn!(error = %error, "markdown render failed; showing plain text");
                Self::Plain(text.to_string())
            }
        }
    }

    pub fn source_text(&self) -> &str {
        match self {
            Self::Html { source, .. } => source,
            Self::Plain(text) => text,
        }
    }
}

/// CommonMark renderer with tables and strikethrough; raw HTML in the input is escaped.
#[derive(Debug, Clone, Copy)]
pub struct MarkdownHtmlRenderer {
    options: Options,
}

impl Default for MarkdownHtmlRenderer {
    fn default() -> Self {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        Self { options }
    }
}

impl MarkdownRenderer for MarkdownHtmlRenderer {
    fn render(&self, text: &str) -> Result<String, RenderError> {
        let parser = Parser::new_ext(text, self.options).map(|event| match event {
            Event::Html(raw) | Event::InlineHtml(raw) => Event::Text(raw),
            other => other,
        });

        let mut html_output = String::with_capacity(text.len() * 3 / 2);
        html::push_html(&mut html_output, parser);
        Ok(html_output)
    }
}

/// Summary of a fenced or indented code block, used to attach copy actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeBlockInfo {
    pub language: Option<String>,
}

pub fn code_blocks(text: &str) -> Vec<CodeBlockInfo> {
    Parser::new(text)
        .filter_map(|event| match event {
            Event::Start(Tag::CodeBlock(kind)) => Some(CodeBlockInfo {
                language: match kind {
                    CodeBlockKind::Fenced(language) if !language.trim().is_empty() => {
                        Some(language.trim().to_string())
                    }
                    _ => None,
                },
            }),
            _ => None,
        })
        .collect()
}
