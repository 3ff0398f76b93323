//! Markdown note renderer.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use ytx_models::{Analysis, RawContent};
use ytx_queue::{is_relative_label, QueueItem};

use crate::error::{WorkerError, WorkerResult};
use crate::pipeline::Renderer;

/// Writes `<output_dir>/<category>/<video_id>.md` with YAML front matter.
pub struct MarkdownRenderer {
    output_dir: PathBuf,
}

impl MarkdownRenderer {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
        }
    }

    /// Categories are re-checked here because a snapshot edited on disk
    /// bypasses enqueue validation.
    fn target_path(&self, item: &QueueItem, raw: &RawContent) -> WorkerResult<PathBuf> {
        let mut dir = self.output_dir.clone();
        if let Some(category) = &item.category {
            if !is_relative_label(category) {
                return Err(WorkerError::render(format!(
                    "Category {:?} is not a relative path",
                    category
                )));
            }
            dir.push(category);
        }
        if !is_relative_label(&raw.meta.video_id) {
            return Err(WorkerError::render(format!(
                "Video id {:?} is not a valid file name",
                raw.meta.video_id
            )));
        }
        Ok(dir.join(format!("{}.md", raw.meta.video_id)))
    }
}

#[async_trait]
impl Renderer for MarkdownRenderer {
    async fn render(
        &self,
        item: &QueueItem,
        raw: &RawContent,
        analysis: &Analysis,
    ) -> WorkerResult<String> {
        let path = self.target_path(item, raw)?;
        let document = render_document(item, raw, analysis)?;

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                WorkerError::render(format!("Failed to create {}: {}", parent.display(), e))
            })?;
        }
        tokio::fs::write(&path, document)
            .await
            .map_err(|e| WorkerError::render(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(path.to_string_lossy().into_owned())
    }
}

fn render_document(item: &QueueItem, raw: &RawContent, analysis: &Analysis) -> WorkerResult<String> {
    let meta = &raw.meta;
    let mut front: Vec<(&str, serde_json::Value)> = vec![
        ("type", "video-notes".into()),
        ("source", "youtube".into()),
        ("url", meta.url.clone().into()),
        ("video_id", meta.video_id.clone().into()),
        ("title", meta.title.clone().into()),
        ("channel", meta.channel.clone().into()),
        ("published", meta.published_at.clone().into()),
        ("duration", meta.duration_formatted().into()),
        ("created", Utc::now().format("%Y-%m-%d %H:%M").to_string().into()),
        ("tags", meta.tags.clone().into()),
    ];
    if let Some(category) = &item.category {
        front.push(("category", category.clone().into()));
    }

    let mut out = String::from("---\n");
    for (key, value) in front {
        // JSON scalars and arrays are valid YAML flow values.
        out.push_str(&format!("{}: {}\n", key, serde_json::to_string(&value)?));
    }
    out.push_str("---\n\n");

    out.push_str(&format!("# {}\n\n", meta.title));

    if !analysis.summary.trim().is_empty() {
        out.push_str("## Summary\n\n");
        out.push_str(analysis.summary.trim());
        out.push_str("\n\n");
    }

    if !analysis.key_insights.is_empty() {
        out.push_str("## Key Insights\n\n");
        for insight in &analysis.key_insights {
            out.push_str(&format!("- {}\n", insight.trim()));
        }
        out.push('\n');
    }

    if !analysis.frameworks.is_empty() {
        out.push_str("## Frameworks\n\n");
        for framework in &analysis.frameworks {
            out.push_str(&format!("### {}\n\n", framework.name.trim()));
            if !framework.description.trim().is_empty() {
                out.push_str(framework.description.trim());
                out.push_str("\n\n");
            }
            for (n, step) in framework.steps.iter().enumerate() {
                out.push_str(&format!("{}. {}\n", n + 1, step.trim()));
            }
            if !framework.steps.is_empty() {
                out.push('\n');
            }
        }
    }

    if !analysis.key_moments.is_empty() {
        out.push_str("## Key Moments\n\n");
        for moment in &analysis.key_moments {
            out.push_str(&format!("- {}\n", moment.render()));
        }
        out.push('\n');
    }

    Ok(format!("{}\n", out.trim_end()))
}
