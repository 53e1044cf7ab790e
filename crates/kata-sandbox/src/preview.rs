//! Preview rendering per exercise kind.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::console::Console;
use crate::css::scope_stylesheet;
use crate::dom::escape_text;
use crate::error::Result;
use crate::host::{HostPage, PREVIEW_CONTAINER_ID};
use crate::script::{run_isolated, SandboxLimits, ScriptFault};

/// Shown in place of the console block when a script logged nothing.
pub const EMPTY_CONSOLE_PLACEHOLDER: &str = "(no console output)";

/// How an exercise's source is turned into a preview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExerciseKind {
    /// HTML rendered as is.
    Markup,
    /// CSS applied to fixture markup.
    Stylesheet,
    /// JavaScript whose console output is shown.
    Script,
    /// JavaScript that manipulates fixture markup.
    DomScript,
}

impl ExerciseKind {
    /// Returns the catalog spelling of this kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Markup => "markup",
            Self::Stylesheet => "stylesheet",
            Self::Script => "script",
            Self::DomScript => "domScript",
        }
    }

    /// Returns `true` for kinds whose source is executed.
    #[must_use]
    pub const fn runs_script(self) -> bool {
        matches!(self, Self::Script | Self::DomScript)
    }
}

impl fmt::Display for ExerciseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything needed to render one preview.
#[derive(Debug, Clone, Copy)]
pub struct PreviewRequest<'a> {
    /// Exercise kind.
    pub kind: ExerciseKind,
    /// Learner source.
    pub source: &'a str,
    /// Script run before the learner's, in the same context (`script` only).
    pub setup_source: Option<&'a str>,
    /// Fixture markup (`stylesheet` and `domScript`).
    pub fixture_markup: Option<&'a str>,
    /// Fixture stylesheet (`stylesheet` and `domScript`).
    pub fixture_style: Option<&'a str>,
}

impl<'a> PreviewRequest<'a> {
    /// Creates a request without setup code or fixtures.
    #[must_use]
    pub const fn new(kind: ExerciseKind, source: &'a str) -> Self {
        Self {
            kind,
            source,
            setup_source: None,
            fixture_markup: None,
            fixture_style: None,
        }
    }

    /// Sets the setup script.
    #[must_use]
    pub const fn with_setup(mut self, setup: Option<&'a str>) -> Self {
        self.setup_source = setup;
        self
    }

    /// Sets the fixture markup and stylesheet.
    #[must_use]
    pub const fn with_fixture(mut self, markup: Option<&'a str>, style: Option<&'a str>) -> Self {
        self.fixture_markup = markup;
        self.fixture_style = style;
        self
    }
}

/// A rendered preview.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preview {
    /// Kind the preview was rendered for.
    pub kind: ExerciseKind,
    /// Preview markup, including any console or error block.
    pub html: String,
    /// Captured console lines.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub console: Vec<String>,
    /// The fault that ended the script, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fault: Option<ScriptFault>,
}

impl Preview {
    /// Returns the preview markup.
    #[must_use]
    pub fn html(&self) -> &str {
        &self.html
    }

    /// Returns `true` if the script faulted.
    #[must_use]
    pub const fn is_fault(&self) -> bool {
        self.fault.is_some()
    }
}

fn console_block(lines: &[String]) -> String {
    let body = if lines.is_empty() {
        EMPTY_CONSOLE_PLACEHOLDER.to_string()
    } else {
        escape_text(&lines.join("\n"))
    };
    format!("<pre class=\"kata-console\">{body}</pre>")
}

fn error_block(fault: &ScriptFault) -> String {
    format!(
        "<pre class=\"kata-error\">{}</pre>",
        escape_text(&fault.to_string())
    )
}

fn style_block(css: &str) -> String {
    format!(
        "<style>{}</style>",
        scope_stylesheet(css, &format!("#{PREVIEW_CONTAINER_ID}"))
    )
}

/// Renders previews into a host page.
///
/// Console output produced while rendering is captured into the preview;
/// output produced outside a render goes to the console's sink.
#[derive(Debug)]
pub struct Sandbox {
    console: Console,
    page: HostPage,
    limits: SandboxLimits,
}

impl Sandbox {
    /// Creates a sandbox with the default page and a `tracing` console.
    pub fn new(limits: SandboxLimits) -> Result<Self> {
        Self::with_console(limits, Console::default())
    }

    /// Creates a sandbox whose uncaptured console output goes to `console`.
    pub fn with_console(limits: SandboxLimits, console: Console) -> Result<Self> {
        limits.validate()?;
        Ok(Self {
            console,
            page: HostPage::new(),
            limits,
        })
    }

    /// Replaces the host page.
    #[must_use]
    pub fn with_page(mut self, page: HostPage) -> Self {
        self.page = page;
        self
    }

    /// Returns the execution budgets.
    #[must_use]
    pub const fn limits(&self) -> &SandboxLimits {
        &self.limits
    }

    /// Returns the host console.
    pub fn console_mut(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Returns the host page.
    #[must_use]
    pub const fn page(&self) -> &HostPage {
        &self.page
    }

    /// Renders `request` into the preview container.
    ///
    /// Script faults never escape: they become part of the returned
    /// preview.
    pub fn render(&mut self, request: &PreviewRequest<'_>) -> Preview {
        tracing::debug!(
            kind = %request.kind,
            bytes = request.source.len(),
            "rendering preview"
        );
        self.page.reset_preview();
        let preview = match request.kind {
            ExerciseKind::Markup => self.static_preview(request.kind, request.source.to_string()),
            ExerciseKind::Stylesheet => {
                let mut html = request.fixture_style.map(style_block).unwrap_or_default();
                html.push_str(&style_block(request.source));
                html.push_str(request.fixture_markup.unwrap_or_default());
                self.static_preview(request.kind, html)
            }
            ExerciseKind::Script => self.render_script(request),
            ExerciseKind::DomScript => self.render_dom_script(request),
        };
        if let Some(fault) = &preview.fault {
            tracing::debug!(kind = %request.kind, fault = %fault, "preview script faulted");
        }
        preview
    }

    fn static_preview(&mut self, kind: ExerciseKind, html: String) -> Preview {
        self.page.set_preview_html(&html);
        Preview {
            kind,
            html,
            console: Vec::new(),
            fault: None,
        }
    }

    fn render_script(&mut self, request: &PreviewRequest<'_>) -> Preview {
        let mut capture = self.console.capture(self.limits.max_console_lines);
        let result = run_isolated(capture.console(), None, self.limits, |interp| {
            if let Some(setup) = request.setup_source {
                interp.run(setup)?;
            }
            interp.run(request.source).map(drop)
        });
        let console = capture.finish();
        let (html, fault) = match result {
            Ok(()) => (console_block(&console), None),
            Err(fault) => (error_block(&fault), Some(fault)),
        };
        self.page.set_preview_html(&html);
        Preview {
            kind: request.kind,
            html,
            console,
            fault,
        }
    }

    fn render_dom_script(&mut self, request: &PreviewRequest<'_>) -> Preview {
        let mut seed = request.fixture_style.map(style_block).unwrap_or_default();
        seed.push_str(request.fixture_markup.unwrap_or_default());
        self.page.set_preview_html(&seed);

        let result = {
            let mut confined = self.page.confine();
            let mut capture = self.console.capture(self.limits.max_console_lines);
            let result = run_isolated(
                capture.console(),
                Some(confined.page()),
                self.limits,
                |interp| interp.run(request.source).map(drop),
            );
            (result, capture.finish())
        };
        let (result, console) = result;

        let mut html = self.page.preview_html();
        let fault = match result {
            Ok(()) => {
                if !console.is_empty() {
                    html.push_str(&console_block(&console));
                }
                None
            }
            Err(fault) => {
                html.push_str(&error_block(&fault));
                Some(fault)
            }
        };
        Preview {
            kind: request.kind,
            html,
            console,
            fault,
        }
    }
}
