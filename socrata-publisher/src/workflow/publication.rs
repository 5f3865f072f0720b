//! Copying and publishing datasets.

use serde_json::{Map, Value};
use tracing::{debug, info};

use super::Waiter;
use crate::client::{SocrataClient, view_path};
use crate::error::{Result, SocrataError};
use crate::model::View;
use crate::response::{decode, expect_accepted, expect_complete};
use crate::transport::{Params, Request};

/// What a copy takes from the source dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyMethod {
    /// Schema, metadata and rows.
    Full,
    /// Schema and metadata only.
    SchemaOnly,
}

impl CopyMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            CopyMethod::Full => "copy",
            CopyMethod::SchemaOnly => "copySchema",
        }
    }
}

impl SocrataClient {
    fn publication_endpoint(&self, id: &str) -> String {
        self.url(&format!("{}/publication", view_path(id)))
    }

    /// Copy `view` and wait for the copy to finish. Returns the new dataset.
    pub async fn copy(&self, view: &View) -> Result<View> {
        self.copy_with_method(view, CopyMethod::Full).await
    }

    /// Copy `view` without its rows, for example ahead of a full replace.
    pub async fn copy_schema(&self, view: &View) -> Result<View> {
        self.copy_with_method(view, CopyMethod::SchemaOnly).await
    }

    pub async fn copy_with_method(&self, view: &View, method: CopyMethod) -> Result<View> {
        let id = view.require_id()?;
        let endpoint = self.publication_endpoint(id);
        let params = Params::new()
            .with("viewId", id)
            .with("method", method.as_str());

        let completed = self
            .ticket_poller()
            .run(Request::post_form(&endpoint, params.clone()), &endpoint, params)
            .await?;

        let copy: View = decode(&completed.body, "view")?;
        let copy_id = copy.require_id()?;
        info!(view_id = %id, copy_id = %copy_id, waits = completed.waits, "Copy finished");
        self.find_view(copy_id).await
    }

    /// Start copying `view` without waiting for it.
    ///
    /// When the server defers the job, the copy may still be running after
    /// this returns.
    pub async fn copy_async(&self, view: &View) -> Result<()> {
        let id = view.require_id()?;
        let form = Params::new().with("viewId", id).with("method", "copy");
        let response = self
            .transport()
            .execute(&Request::post_form(self.publication_endpoint(id), form))
            .await?;
        expect_accepted(response)?;
        info!(view_id = %id, "Copy requested");
        Ok(())
    }

    /// Publish `view` once its geocoding has drained.
    ///
    /// If the publication group already has a published dataset, the server
    /// snapshots it; the returned dataset may have a new id.
    pub async fn publish(&self, view: &View) -> Result<View> {
        let id = view.require_id()?;
        self.wait_for_geocoding(view).await?;

        let endpoint = self.publication_endpoint(id);
        let params = Params::new().with("viewId", id);
        let completed = self
            .ticket_poller()
            .run(Request::post_form(&endpoint, params.clone()), &endpoint, params)
            .await?;

        let published: View = decode(&completed.body, "view")?;
        info!(
            view_id = %id,
            published_id = published.id.as_deref().unwrap_or(""),
            waits = completed.waits,
            "Published view"
        );
        Ok(published)
    }

    /// Number of geocoding requests still queued for `view`.
    pub async fn pending_geocoding_requests(&self, view: &View) -> Result<u64> {
        let id = view.require_id()?;
        let request = Request::get(
            self.url(&format!("/geocoding/{}", id)),
            Params::new().with("method", "pending"),
        );
        let body = expect_complete(self.transport().execute(&request).await?)?;
        let counts: Map<String, Value> = decode(&body, "geocoding status")?;
        counts
            .get("view")
            .and_then(Value::as_u64)
            .ok_or_else(|| SocrataError::UnexpectedResponse {
                message: "geocoding status has no pending count for the view".to_string(),
            })
    }

    /// Poll until no geocoding requests are pending. Returns the number of waits.
    pub async fn wait_for_geocoding(&self, view: &View) -> Result<u32> {
        let mut waiter = Waiter::new(self.geocoding_policy(), self.cancellation_token());
        loop {
            let pending = self.pending_geocoding_requests(view).await?;
            if pending == 0 {
                return Ok(waiter.waits());
            }
            debug!(
                view_id = view.id.as_deref().unwrap_or(""),
                pending,
                "Waiting for geocoding"
            );
            waiter.wait().await?;
        }
    }
}
