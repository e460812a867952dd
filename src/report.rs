use std::collections::BTreeMap;
use std::fs;

use camino::Utf8Path;
use serde::Deserialize;
use tracing::info;

use crate::domain::{ObjectRef, SetItem};
use crate::error::DiffExprError;
use crate::fs_util;
use crate::platform::{
    CreatedObject, FileLink, HtmlLink, ObjectStore, ReportInfo, ReportParams, ReportService,
};
use crate::scratch::ScratchLayout;

pub const RESULT_ARCHIVE: &str = "cuffdiff_result.zip";
pub const REPORT_HTML: &str = "report.html";
const HTML_WINDOW_HEIGHT: u32 = 333;
const OVERVIEW_PLACEHOLDER: &str = "<p>Overview_Content</p>";

const REPORT_TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>Cuffdiff Report</title>
<style>
body { font-family: sans-serif; }
table { border-collapse: collapse; }
th, td { border: 1px solid #ccc; padding: 4px 8px; text-align: left; }
</style>
</head>
<body>
<h3>Cuffdiff Results</h3>
<p>Overview_Content</p>
</body>
</html>
"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSummary {
    pub name: String,
    pub reference: ObjectRef,
    pub condition_1: String,
    pub condition_2: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatrixSetSummary {
    pub name: String,
    pub reference: ObjectRef,
    pub matrices: Vec<MatrixSummary>,
}

#[derive(Deserialize)]
struct MatrixSetData {
    items: Vec<SetItem>,
}

#[derive(Deserialize)]
struct MatrixData {
    condition_mapping: BTreeMap<String, String>,
}

pub struct ReportBuilder<'a, S: ObjectStore, R: ReportService> {
    store: &'a S,
    reports: &'a R,
    layout: &'a ScratchLayout,
}

impl<'a, S: ObjectStore, R: ReportService> ReportBuilder<'a, S, R> {
    pub fn new(store: &'a S, reports: &'a R, layout: &'a ScratchLayout) -> Self {
        Self {
            store,
            reports,
            layout,
        }
    }

    pub fn build(
        &self,
        matrix_set_ref: &ObjectRef,
        workspace_name: &str,
        result_dir: &Utf8Path,
    ) -> Result<ReportInfo, DiffExprError> {
        info!(matrix_set = %matrix_set_ref, "creating report");
        let file_links = vec![self.archive_results(result_dir)?];
        let summary = self.summarize(matrix_set_ref)?;
        let html_links = vec![self.publish_html(&summary)?];

        let mut objects_created = vec![CreatedObject {
            reference: summary.reference.clone(),
            description: "Differential Expression Matrix Set generated by Cuffdiff".to_string(),
        }];
        objects_created.extend(summary.matrices.iter().map(|matrix| CreatedObject {
            reference: matrix.reference.clone(),
            description: "Differential Expression Matrix generated by Cuffdiff".to_string(),
        }));

        let params = ReportParams {
            message: String::new(),
            workspace_name: workspace_name.to_string(),
            file_links,
            objects_created,
            html_links,
            direct_html_link_index: 0,
            html_window_height: HTML_WINDOW_HEIGHT,
            report_object_name: format!("cuffdiff_report_{}", self.layout.run_id()),
        };
        self.reports.create_report(&params)
    }

    fn archive_results(&self, result_dir: &Utf8Path) -> Result<FileLink, DiffExprError> {
        let output_dir = self.layout.unique_dir("outfile_")?;
        let zip_path = output_dir.join(RESULT_ARCHIVE);
        let written = fs_util::zip_dir_flat(
            result_dir.as_std_path(),
            zip_path.as_std_path(),
            |path| {
                let name = path
                    .file_name()
                    .map(|name| name.to_string_lossy())
                    .unwrap_or_default();
                !(name.ends_with(".zip") || name.ends_with(".png") || name.ends_with(".DS_Store"))
            },
        )?;
        fs_util::validate_zip(zip_path.as_std_path())?;
        info!(archive = %zip_path, files = written, "packed result files");

        Ok(FileLink {
            path: zip_path.to_string(),
            name: RESULT_ARCHIVE.to_string(),
            label: RESULT_ARCHIVE.to_string(),
            description: "File(s) generated by Cuffdiff App".to_string(),
        })
    }

    pub fn summarize(&self, matrix_set_ref: &ObjectRef) -> Result<MatrixSetSummary, DiffExprError> {
        let set = self.store.get_object(matrix_set_ref)?;
        let data: MatrixSetData = set.decode()?;
        let mut matrices = Vec::with_capacity(data.items.len());
        for item in data.items {
            let object = self.store.get_object(&item.reference)?;
            let matrix: MatrixData = object.decode()?;
            let (condition_1, condition_2) =
                matrix.condition_mapping.into_iter().next().ok_or_else(|| {
                    DiffExprError::MalformedResponse(format!(
                        "{} ({}) has an empty condition_mapping",
                        object.info.name, item.reference
                    ))
                })?;
            matrices.push(MatrixSummary {
                name: object.info.name,
                reference: item.reference,
                condition_1,
                condition_2,
            });
        }
        Ok(MatrixSetSummary {
            name: set.info.name,
            reference: matrix_set_ref.clone(),
            matrices,
        })
    }

    fn publish_html(&self, summary: &MatrixSetSummary) -> Result<HtmlLink, DiffExprError> {
        let dir = self.layout.unique_dir("report_")?;
        let path = dir.join(REPORT_HTML);
        fs::write(path.as_std_path(), render_html(summary))
            .map_err(|err| DiffExprError::Filesystem(format!("write {path}: {err}")))?;
        let shock_id = self.reports.upload_directory(dir.as_std_path())?;
        Ok(HtmlLink {
            shock_id,
            name: REPORT_HTML.to_string(),
            label: REPORT_HTML.to_string(),
            description: "HTML summary report for Cuffdiff App".to_string(),
        })
    }
}

pub fn render_html(summary: &MatrixSetSummary) -> String {
    let mut content = String::new();
    content.push_str("<br/><table><tr><th>Generated DifferentialExpressionMatrixSet Object</th></tr>");
    content.push_str(&format!(
        "<tr><td>{} ({})</td></tr></table>",
        escape(&summary.name),
        escape(summary.reference.as_str())
    ));
    content.push_str("<p><br/></p>");
    content.push_str("<br/><table><tr><th>Generated DifferentialExpressionMatrix Object</th><th></th><th></th></tr>");
    content.push_str(
        "<tr><th>Differential Expression Matrix Name</th><th>Condition 1</th><th>Condition 2</th></tr>",
    );
    for matrix in &summary.matrices {
        content.push_str(&format!(
            "<tr><td>{} ({})</td><td>{}</td><td>{}</td></tr>",
            escape(&matrix.name),
            escape(matrix.reference.as_str()),
            escape(&matrix.condition_1),
            escape(&matrix.condition_2)
        ));
    }
    content.push_str("</table>");
    REPORT_TEMPLATE.replace(OVERVIEW_PLACEHOLDER, &content)
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn html_lists_every_matrix() {
        let summary = MatrixSetSummary {
            name: "de_set".to_string(),
            reference: "1/9/1".parse().unwrap(),
            matrices: vec![MatrixSummary {
                name: "de_set-WT-MU".to_string(),
                reference: "1/10/1".parse().unwrap(),
                condition_1: "WT".to_string(),
                condition_2: "MU<2>".to_string(),
            }],
        };
        let html = render_html(&summary);
        assert!(html.contains("de_set (1/9/1)"));
        assert!(html.contains("<td>de_set-WT-MU (1/10/1)</td><td>WT</td><td>MU&lt;2&gt;</td>"));
        assert!(!html.contains(OVERVIEW_PLACEHOLDER));
    }
}
