//! Diagram rendering through an external Mermaid program.
//!
//! Each render gets a fresh identifier so concurrent renders never collide.
//! A render failure is not fatal: the view falls back to the raw diagram text.

use std::process::Stdio;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{CanvasError, Result};
use crate::sanitize::DiagramDescription;

/// Boundary to the program that turns Mermaid text into SVG.
#[async_trait]
pub trait DiagramRenderer: Send + Sync + std::fmt::Debug {
    /// Renders `diagram` to SVG markup, tagging the root element with `id`.
    async fn render(&self, id: &str, diagram: &DiagramDescription) -> Result<String>;
}

/// Renderer that pipes diagrams through the Mermaid CLI (`mmdc`).
#[derive(Debug, Clone)]
pub struct MermaidCliRenderer {
    command: String,
}

impl MermaidCliRenderer {
    /// Creates a renderer that invokes `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }
}

#[async_trait]
impl DiagramRenderer for MermaidCliRenderer {
    async fn render(&self, id: &str, diagram: &DiagramDescription) -> Result<String> {
        let mut child = Command::new(&self.command)
            .args(["--input", "-", "--output", "-", "--outputFormat", "svg"])
            .args(["--svgId", id])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CanvasError::render(format!("failed to start '{}': {e}", self.command)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(diagram.as_str().as_bytes())
                .await
                .map_err(|e| CanvasError::render(format!("failed to write diagram: {e}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| CanvasError::render(format!("renderer did not finish: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(CanvasError::render(stderr.trim().to_string()));
        }

        let svg = String::from_utf8_lossy(&output.stdout).into_owned();
        if !svg.contains("<svg") {
            return Err(CanvasError::render("renderer produced no SVG output"));
        }
        Ok(svg)
    }
}

/// Renderer used when rendering is switched off in the configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledRenderer;

#[async_trait]
impl DiagramRenderer for DisabledRenderer {
    async fn render(&self, _id: &str, _diagram: &DiagramDescription) -> Result<String> {
        Err(CanvasError::render("diagram rendering is disabled"))
    }
}

/// What the canvas view shows for the current diagram.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagramView {
    /// No diagram has been produced yet.
    Empty,
    /// Rendered vector graphic.
    Graphic {
        /// Render identifier.
        id: String,
        /// SVG markup.
        svg: String,
    },
    /// Raw diagram text shown because rendering failed.
    Fallback {
        /// Render identifier.
        id: String,
        /// Unrendered Mermaid text.
        raw: String,
        /// Why rendering failed.
        error: String,
    },
}

/// Renders `diagram` with a fresh id, falling back to raw text on failure.
pub async fn render_diagram(
    renderer: &dyn DiagramRenderer,
    diagram: &DiagramDescription,
) -> DiagramView {
    if diagram.is_empty() {
        return DiagramView::Empty;
    }

    let id = format!("mermaid-{}", Uuid::new_v4());
    match renderer.render(&id, diagram).await {
        Ok(svg) => {
            debug!(%id, bytes = svg.len(), "Diagram rendered");
            DiagramView::Graphic { id, svg }
        }
        Err(e) => {
            warn!(%id, error = %e, "Diagram render failed, showing raw text");
            DiagramView::Fallback {
                id,
                raw: diagram.as_str().to_string(),
                error: e.to_string(),
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::sanitize::sanitize_diagram;

    #[derive(Debug, Default)]
    struct RecordingRenderer {
        ids: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl DiagramRenderer for RecordingRenderer {
        async fn render(&self, id: &str, diagram: &DiagramDescription) -> Result<String> {
            self.ids.lock().unwrap().push(id.to_string());
            if diagram.as_str().starts_with("graph") {
                Ok(format!(r#"<svg id="{id}"></svg>"#))
            } else {
                Err(CanvasError::render("Parse error on line 1"))
            }
        }
    }

    #[tokio::test]
    async fn test_successful_render_is_graphic() {
        let renderer = RecordingRenderer::default();
        let view = render_diagram(&renderer, &sanitize_diagram("graph TD\nA-->B")).await;

        assert!(
            matches!(&view, DiagramView::Graphic { id, svg }
                if id.starts_with("mermaid-") && svg.contains(id.as_str())),
            "expected graphic, got {view:?}"
        );
    }

    #[tokio::test]
    async fn test_failed_render_falls_back_to_raw_text() {
        let renderer = RecordingRenderer::default();
        let view = render_diagram(&renderer, &sanitize_diagram("not mermaid")).await;

        assert!(matches!(
            view,
            DiagramView::Fallback { ref raw, ref error, .. }
                if raw == "not mermaid" && error.contains("Parse error")
        ));
    }

    #[tokio::test]
    async fn test_each_render_gets_fresh_id() {
        let renderer = RecordingRenderer::default();
        let diagram = sanitize_diagram("graph TD");
        render_diagram(&renderer, &diagram).await;
        render_diagram(&renderer, &diagram).await;

        let ids = renderer.ids.lock().unwrap();
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
    }

    #[tokio::test]
    async fn test_empty_diagram_is_not_rendered() {
        let renderer = RecordingRenderer::default();
        let view = render_diagram(&renderer, &DiagramDescription::default()).await;
        assert_eq!(view, DiagramView::Empty);
        assert!(renderer.ids.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_renderer_falls_back() {
        let view = render_diagram(&DisabledRenderer, &sanitize_diagram("graph TD")).await;
        assert!(matches!(view, DiagramView::Fallback { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_render_error() {
        let renderer = MermaidCliRenderer::new("code-canvas-no-such-mmdc");
        let err = renderer
            .render("mermaid-test", &sanitize_diagram("graph TD"))
            .await
            .unwrap_err();
        assert!(matches!(err, CanvasError::Render { .. }));
    }
}
