//! File scans and imports.
//!
//! Every import first uploads the file for a scan. The scan report's
//! `fileId` then identifies the upload in the ticketed import request.

use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::client::SocrataClient;
use crate::error::{Result, SocrataError};
use crate::model::View;
use crate::response::{decode, expect_accepted};
use crate::transport::{Params, Request, file_name};

const IMPORTS_PATH: &str = "/imports2";

/// Which rows an import into an existing dataset keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportMode {
    /// Add the file's rows after the existing ones.
    Append,
    /// Delete every existing row, then append.
    Replace,
}

impl ImportMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ImportMode::Append => "append",
            ImportMode::Replace => "replace",
        }
    }
}

/// Read the `fileId` of a scan report.
pub fn file_id(report: &Map<String, Value>) -> Result<&str> {
    report
        .get("fileId")
        .and_then(Value::as_str)
        .ok_or_else(|| SocrataError::UnexpectedResponse {
            message: "scan report has no fileId".to_string(),
        })
}

impl SocrataClient {
    /// Upload `file` for scanning and return the server's report.
    pub async fn scan(&self, file: &Path) -> Result<Map<String, Value>> {
        debug!(file = %file.display(), "Scanning file for import");
        let request = Request::post_file(
            self.url(IMPORTS_PATH),
            Params::new().with("method", "scan"),
            file,
        );
        let body = expect_accepted(self.transport().execute(&request).await?)?;
        decode(&body, "scan report")
    }

    /// Create a new dataset from `file`, using `view`'s name, description and
    /// columns as the blueprint.
    pub async fn create_from_file(&self, view: &View, file: &Path, translation: &str) -> Result<View> {
        let blueprint = serde_json::to_string(&view.blueprint())?;
        let params = Params::new()
            .with("name", file_name(file)?)
            .with("translation", translation)
            .with("blueprint", blueprint);
        self.import(params, file).await
    }

    /// Append the rows of `file` to `view`, skipping `skip` header rows.
    pub async fn append(&self, view: &View, file: &Path, skip: u32, translation: &str) -> Result<View> {
        self.import_into(ImportMode::Append, view, file, skip, translation)
            .await
    }

    /// Replace every row of `view` with the rows of `file`.
    pub async fn replace(&self, view: &View, file: &Path, skip: u32, translation: &str) -> Result<View> {
        self.import_into(ImportMode::Replace, view, file, skip, translation)
            .await
    }

    async fn import_into(
        &self,
        mode: ImportMode,
        view: &View,
        file: &Path,
        skip: u32,
        translation: &str,
    ) -> Result<View> {
        let params = Params::new()
            .with("method", mode.as_str())
            .with("viewUid", view.require_id()?)
            .with("name", file_name(file)?)
            .with("translation", translation)
            .with("skip", skip.to_string());
        self.import(params, file).await
    }

    async fn import(&self, mut params: Params, file: &Path) -> Result<View> {
        let report = self.scan(file).await?;
        params.set("fileId", file_id(&report)?);

        let endpoint = self.url(IMPORTS_PATH);
        let completed = self
            .ticket_poller()
            .run(Request::post_form(&endpoint, params.clone()), &endpoint, params)
            .await?;

        let imported: View = decode(&completed.body, "view")?;
        let id = imported.require_id()?;
        info!(view_id = %id, waits = completed.waits, "Import finished");
        self.find_view(id).await
    }
}
