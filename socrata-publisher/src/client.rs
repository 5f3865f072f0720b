//! The publisher client: CRUD on views, columns and rows.
//!
//! Ticketed workflows (imports, copies, publishing) live in
//! [`crate::workflow`] as further `impl SocrataClient` blocks.

use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{PollingConfig, SocrataConfig};
use crate::error::{Result, SocrataError};
use crate::model::view::ColumnSwap;
use crate::model::{BulkResult, Column, Row, View};
use crate::response::{decode, expect_accepted, expect_complete, expect_json};
use crate::transport::{HttpTransport, Params, Request, Transport};
use crate::workflow::{PollPolicy, TicketPoller};

/// Client for the publisher API.
///
/// Cheap to clone: clones share the transport and the cancellation token.
#[derive(Clone)]
pub struct SocrataClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    ticket_policy: PollPolicy,
    geocoding_policy: PollPolicy,
    cancel: CancellationToken,
}

impl std::fmt::Debug for SocrataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SocrataClient")
            .field("base_url", &self.base_url)
            .field("ticket_policy", &self.ticket_policy)
            .field("geocoding_policy", &self.geocoding_policy)
            .finish()
    }
}

impl SocrataClient {
    /// A client over `transport`, with the default polling settings.
    pub fn new(transport: Arc<dyn Transport>, base_url: impl Into<String>) -> Self {
        let polling = PollingConfig::default();
        Self {
            transport,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            ticket_policy: polling.ticket_policy(),
            geocoding_policy: polling.geocoding_policy(),
            cancel: CancellationToken::new(),
        }
    }

    /// Build an HTTP-backed client from loaded configuration.
    pub fn from_config(config: &SocrataConfig) -> Result<Self> {
        for warning in config.validate() {
            warn!(warning = %warning, "Configuration warning");
        }
        let transport = HttpTransport::from_config(&config.connection)?;
        Ok(Self::new(Arc::new(transport), &config.connection.base_url).with_polling(&config.polling))
    }

    pub fn with_polling(self, polling: &PollingConfig) -> Self {
        self.with_ticket_policy(polling.ticket_policy())
            .with_geocoding_policy(polling.geocoding_policy())
    }

    pub fn with_ticket_policy(mut self, policy: PollPolicy) -> Self {
        self.ticket_policy = policy;
        self
    }

    pub fn with_geocoding_policy(mut self, policy: PollPolicy) -> Self {
        self.geocoding_policy = policy;
        self
    }

    /// Use `token` to cancel every polling wait of this client.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL of an API path such as `/views/abcd-1234`.
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub(crate) fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub(crate) fn geocoding_policy(&self) -> &PollPolicy {
        &self.geocoding_policy
    }

    pub(crate) fn ticket_poller(&self) -> TicketPoller<'_> {
        TicketPoller::new(self.transport(), self.ticket_policy, self.cancel.clone())
    }

    async fn send(&self, request: Request) -> Result<String> {
        let response = self.transport.execute(&request).await?;
        expect_complete(response)
    }

    /// Like `send`, but a 202 also succeeds. Deletes may be queued.
    async fn send_accepted(&self, request: Request) -> Result<String> {
        let response = self.transport.execute(&request).await?;
        expect_accepted(response)
    }

    // -----------------------------------------------------------------------
    // Views
    // -----------------------------------------------------------------------

    /// Fetch a view with its full metadata.
    pub async fn find_view(&self, id: &str) -> Result<View> {
        debug!(view_id = %id, "Fetching view");
        let body = self.send(Request::get(self.url(&view_path(id)), Params::new())).await?;
        decode(&body, "view")
    }

    /// Create a new, empty dataset.
    pub async fn create_view(&self, view: &View) -> Result<View> {
        let request = Request::post_text(self.url("/views"), Params::new(), serde_json::to_string(view)?);
        let created: View = decode(&self.send(request).await?, "view")?;
        info!(view_id = created.id.as_deref().unwrap_or(""), "Created view");
        Ok(created)
    }

    /// Save the changes made to `view`.
    ///
    /// With `update_columns`, columns that do not exist yet are created
    /// through the columns service first, and the view is saved with the
    /// resulting column list. `view` keeps its own columns either way.
    pub async fn update_view(&self, view: &mut View, update_columns: bool) -> Result<View> {
        let id = view.require_id()?.to_string();
        if !update_columns {
            return self.put_view(&id, view).await;
        }

        let mut columns = Vec::with_capacity(view.columns.len());
        for column in &view.columns {
            if column.is_persisted() {
                columns.push(column.clone());
            } else {
                columns.push(self.create_column(view, column).await?);
            }
        }

        let swapped = ColumnSwap::new(view, columns);
        self.put_view(&id, &swapped).await
    }

    async fn put_view(&self, id: &str, view: &View) -> Result<View> {
        let request = Request::put_text(
            self.url(&view_path(id)),
            Params::new(),
            serde_json::to_string(view)?,
        );
        let body = self.send(request).await?;
        info!(view_id = %id, "Updated view");
        decode(&body, "view")
    }

    pub async fn delete_view(&self, view: &View) -> Result<()> {
        let id = view.require_id()?;
        self.send_accepted(Request::delete(self.url(&view_path(id))))
            .await?;
        info!(view_id = %id, "Deleted view");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Columns
    // -----------------------------------------------------------------------

    /// Create `column` on `view`. The returned column carries its new id.
    pub async fn create_column(&self, view: &View, column: &Column) -> Result<Column> {
        let id = view.require_id()?;
        let draft = Column {
            id: 0,
            ..column.clone()
        };
        let request = Request::post_text(
            self.url(&format!("{}/columns", view_path(id))),
            Params::new(),
            serde_json::to_string(&draft)?,
        );
        let created: Column = decode(&self.send(request).await?, "column")?;
        debug!(view_id = %id, column_id = created.id, name = %created.name, "Created column");
        Ok(created)
    }

    pub async fn update_column(&self, view: &View, column: &Column) -> Result<Column> {
        let request = Request::put_text(
            self.url(&column_path(view, column)?),
            Params::new(),
            serde_json::to_string(column)?,
        );
        decode(&self.send(request).await?, "column")
    }

    pub async fn delete_column(&self, view: &View, column: &Column) -> Result<()> {
        self.send_accepted(Request::delete(self.url(&column_path(view, column)?)))
            .await?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Rows
    // -----------------------------------------------------------------------

    /// Fetch one row by its identifier: the row id, or the value of the
    /// view's row identifier column.
    ///
    /// The response is keyed by field name; keys matching no column are dropped.
    pub async fn get_row(&self, view: &View, identifier: &str) -> Result<Row> {
        if identifier.is_empty() {
            return Err(SocrataError::precondition(
                "a row identifier must be provided to get a row",
            ));
        }
        let id = view.require_id()?;
        let url = self.url(&format!("{}/rows/{}", view_path(id), identifier));
        let body = self.send(Request::get(url, Params::new())).await?;
        let map: Map<String, Value> = decode(&body, "row")?;
        Ok(Row::from_identifier_json(view, map))
    }

    pub async fn get_row_by_sid(&self, view: &View, sid: i64) -> Result<Row> {
        self.get_row(view, &sid.to_string()).await
    }

    /// Fetch `length` rows starting at row `start`.
    pub async fn get_rows(&self, view: &View, start: u64, length: u64) -> Result<Vec<Row>> {
        let id = view.require_id()?;
        let form = Params::new()
            .with("method", "getRows")
            .with("start", start.to_string())
            .with("length", length.to_string());
        let response = self
            .transport
            .execute(&Request::post_form(self.url(&format!("{}/rows", view_path(id))), form))
            .await?;
        expect_json(response, "list of rows")
    }

    /// Add `row` to the end of `view`.
    pub async fn append_row(&self, view: &View, row: &Row) -> Result<Row> {
        let id = view.require_id()?;
        let request = Request::post_text(
            self.url(&format!("{}/rows", view_path(id))),
            Params::new(),
            serde_json::to_string(row)?,
        );
        decode(&self.send(request).await?, "row")
    }

    pub async fn update_row(&self, view: &View, row: &Row) -> Result<Row> {
        let request = Request::put_text(
            self.url(&row_path(view, row)?),
            Params::new(),
            serde_json::to_string(row)?,
        );
        decode(&self.send(request).await?, "row")
    }

    pub async fn delete_row(&self, view: &View, row: &Row) -> Result<()> {
        self.send_accepted(Request::delete(self.url(&row_path(view, row)?)))
            .await?;
        Ok(())
    }

    /// Insert or update `rows` in one request, matched by the row identifier column.
    pub async fn upsert(&self, view: &View, rows: &[Row]) -> Result<BulkResult> {
        let id = view.require_id()?;
        let payload: Vec<_> = rows.iter().map(Row::as_new_row).collect();
        let request = Request::post_text(
            self.url(&format!("/id/{}", id)),
            Params::new(),
            serde_json::to_string(&payload)?,
        );
        let result: BulkResult = decode(&self.send(request).await?, "bulk result")?;
        info!(
            view_id = %id,
            created = result.rows_created,
            updated = result.rows_updated,
            deleted = result.rows_deleted,
            errors = result.error_count,
            "Upserted rows"
        );
        Ok(result)
    }
}

pub(crate) fn view_path(id: &str) -> String {
    format!("/views/{}", id)
}

fn column_path(view: &View, column: &Column) -> Result<String> {
    let id = view.require_id()?;
    if !column.is_persisted() || !view.contains_column(column) {
        return Err(SocrataError::precondition(format!(
            "column '{}' is not a saved column of this view",
            column.name
        )));
    }
    Ok(format!("{}/columns/{}", view_path(id), column.id))
}

fn row_path(view: &View, row: &Row) -> Result<String> {
    let id = view.require_id()?;
    if row.sid == 0 {
        return Err(SocrataError::precondition("the row has not been created yet"));
    }
    Ok(format!("{}/rows/{}", view_path(id), row.sid))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Body, Method, ScriptedTransport};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    const BASE: &str = "https://data.example.gov/api";

    fn client() -> (Arc<ScriptedTransport>, SocrataClient) {
        let transport = Arc::new(ScriptedTransport::new());
        let client = SocrataClient::new(transport.clone(), format!("{}/", BASE));
        (transport, client)
    }

    fn saved_view() -> View {
        serde_json::from_value(json!({
            "id": "abcd-1234",
            "name": "Inspections",
            "columns": [
                {"id": 11, "name": "Name", "dataTypeName": "text", "position": 1},
                {"id": 12, "name": "Score", "dataTypeName": "number", "position": 2}
            ]
        }))
        .unwrap()
    }

    fn text_body(request: &Request) -> Value {
        match &request.body {
            Body::Text(text) => serde_json::from_str(text).unwrap(),
            other => panic!("expected a text body, got {:?}", other),
        }
    }

    #[test]
    fn test_url_trims_trailing_slash() {
        let (_, client) = client();
        assert_eq!(client.url("/views"), "https://data.example.gov/api/views");
    }

    #[tokio::test]
    async fn test_find_view() {
        let (transport, client) = client();
        transport.push(200, serde_json::to_string(&saved_view()).unwrap());

        let view = client.find_view("abcd-1234").await.unwrap();
        assert_eq!(view.columns.len(), 2);
        let requests = transport.requests();
        assert_eq!(requests[0].method, Method::Get);
        assert_eq!(requests[0].url, format!("{}/views/abcd-1234", BASE));
    }

    #[tokio::test]
    async fn test_find_view_not_found() {
        let (transport, client) = client();
        transport.push(404, r#"{"code":"not_found","message":"View not found"}"#);

        let err = client.find_view("zzzz-0000").await.unwrap_err();
        assert!(matches!(err, SocrataError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_update_view_creates_new_columns_first() {
        let (transport, client) = client();
        let mut view = saved_view();
        view.add_column(Column::new("Grade", "text").with_description("Letter grade"));

        transport.push(
            200,
            r#"{"id": 13, "name": "Grade", "dataTypeName": "text", "position": 3, "description": "Letter grade"}"#,
        );
        transport.push(200, r#"{"id": "abcd-1234", "name": "Inspections"}"#);

        client.update_view(&mut view, true).await.unwrap();

        let requests = transport.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].method, Method::Post);
        assert_eq!(requests[0].url, format!("{}/views/abcd-1234/columns", BASE));
        assert_eq!(text_body(&requests[0])["description"], json!("Letter grade"));

        assert_eq!(requests[1].method, Method::Put);
        let sent = text_body(&requests[1]);
        let ids: Vec<i64> = sent["columns"]
            .as_array()
            .unwrap()
            .iter()
            .map(|c| c["id"].as_i64().unwrap())
            .collect();
        assert_eq!(ids, vec![11, 12, 13]);

        // The caller's view still holds its own, unsaved column.
        assert_eq!(view.columns[2].id, 0);
    }

    #[tokio::test]
    async fn test_update_view_restores_columns_on_failure() {
        let (transport, client) = client();
        let mut view = saved_view();
        view.add_column(Column::new("Grade", "text"));
        let before = view.columns.clone();

        transport.push(200, r#"{"id": 13, "name": "Grade", "dataTypeName": "text"}"#);
        transport.push(500, r#"{"code":"server_error","message":"boom"}"#);

        let err = client.update_view(&mut view, true).await.unwrap_err();
        assert_eq!(err.code(), Some("server_error"));
        assert_eq!(view.columns, before);
    }

    #[tokio::test]
    async fn test_update_view_without_columns_skips_column_service() {
        let (transport, client) = client();
        let mut view = saved_view();
        view.add_column(Column::new("Grade", "text"));
        transport.push(200, r#"{"id": "abcd-1234"}"#);

        client.update_view(&mut view, false).await.unwrap();
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].method, Method::Put);
    }

    #[tokio::test]
    async fn test_column_operations_require_saved_column() {
        let (transport, client) = client();
        let view = saved_view();
        let draft = Column::new("Grade", "text");

        assert!(matches!(
            client.delete_column(&view, &draft).await,
            Err(SocrataError::Precondition { .. })
        ));
        assert!(transport.requests().is_empty());

        transport.push(200, "");
        client.delete_column(&view, &view.columns[1]).await.unwrap();
        assert_eq!(
            transport.requests()[0].url,
            format!("{}/views/abcd-1234/columns/12", BASE)
        );
    }

    #[tokio::test]
    async fn test_get_row_by_identifier() {
        let (transport, client) = client();
        let view = saved_view();
        transport.push(
            200,
            r#"{"_id": 5, "_uuid": "AAAA", "_position": 5, "_address": "x", "name": "Cafe Rio", "score": 91, "extra": 1}"#,
        );

        let row = client.get_row(&view, "Cafe Rio").await.unwrap();
        assert_eq!(row.sid, 5);
        assert_eq!(row.get_field(&view.columns[0]), Some(&json!("Cafe Rio")));
        assert_eq!(row.get_field(&view.columns[1]), Some(&json!(91)));
        assert_eq!(row.data().len(), 2);
    }

    #[tokio::test]
    async fn test_get_row_requires_identifier() {
        let (_, client) = client();
        let err = client.get_row(&saved_view(), "").await.unwrap_err();
        assert!(matches!(err, SocrataError::Precondition { .. }));
    }

    #[tokio::test]
    async fn test_get_rows_posts_form() {
        let (transport, client) = client();
        transport.push(200, r#"[{"sid": 1, "11": "a"}, {"sid": 2, "11": "b"}]"#);

        let rows = client.get_rows(&saved_view(), 0, 2).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].sid, 2);

        let request = &transport.requests()[0];
        match &request.body {
            Body::Form(form) => {
                assert_eq!(form.get("method"), Some("getRows"));
                assert_eq!(form.get("start"), Some("0"));
                assert_eq!(form.get("length"), Some("2"));
            }
            other => panic!("expected a form, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_row_crud() {
        let (transport, client) = client();
        let view = saved_view();
        let mut row = Row::new();
        row.put_field(&view, &view.columns[0], "Cafe Rio").unwrap();

        assert!(matches!(
            client.update_row(&view, &row).await,
            Err(SocrataError::Precondition { .. })
        ));

        transport.push(200, r#"{"sid": 77, "11": "Cafe Rio"}"#);
        let created = client.append_row(&view, &row).await.unwrap();
        assert_eq!(created.sid, 77);
        assert_eq!(text_body(&transport.requests()[0]), json!({"11": "Cafe Rio"}));

        transport.push(200, "");
        client.delete_row(&view, &created).await.unwrap();
        assert_eq!(
            transport.requests()[1].url,
            format!("{}/views/abcd-1234/rows/77", BASE)
        );
    }

    #[tokio::test]
    async fn test_deletes_accept_a_queued_response() {
        let (transport, client) = client();
        let view = saved_view();
        let mut row = Row::new();
        row.sid = 77;

        transport.push(202, "").push(202, "").push(202, "");
        client.delete_row(&view, &row).await.unwrap();
        client.delete_column(&view, &view.columns[1]).await.unwrap();
        client.delete_view(&view).await.unwrap();

        let requests = transport.requests();
        assert!(requests.iter().all(|r| r.method == Method::Delete));
        assert_eq!(requests[1].url, format!("{}/views/abcd-1234/columns/12", BASE));
        assert_eq!(requests[2].url, format!("{}/views/abcd-1234", BASE));
    }

    #[tokio::test]
    async fn test_queued_response_still_fails_a_read() {
        let (transport, client) = client();
        transport.push(202, "");
        let err = client.find_view("abcd-1234").await.unwrap_err();
        assert!(matches!(err, SocrataError::Request { status: 202, .. }));
    }

    #[tokio::test]
    async fn test_update_row_sends_sid() {
        let (transport, client) = client();
        let view = saved_view();
        let mut row = Row::new();
        row.sid = 77;
        row.put_field(&view, &view.columns[1], 95).unwrap();

        transport.push(200, r#"{"sid": 77, "12": 95}"#);
        let updated = client.update_row(&view, &row).await.unwrap();
        assert_eq!(updated.sid, 77);

        let request = &transport.requests()[0];
        assert_eq!(request.method, Method::Put);
        assert_eq!(request.url, format!("{}/views/abcd-1234/rows/77", BASE));
        assert_eq!(text_body(request), json!({"sid": 77, "12": 95}));
    }

    #[tokio::test]
    async fn test_upsert_sends_new_row_shape() {
        let (transport, client) = client();
        let view = saved_view();
        let mut row = Row::new();
        row.put_field(&view, &view.columns[0], "Cafe Rio").unwrap();
        row.put_field(&view, &view.columns[1], 91).unwrap();
        transport.push(
            200,
            r#"{"Rows Updated": 0, "Rows Created": 1, "Rows Deleted": 0, "Errors": 0}"#,
        );

        let result = client.upsert(&view, &[row]).await.unwrap();
        assert_eq!(result.rows_created, 1);

        let request = &transport.requests()[0];
        assert_eq!(request.url, format!("{}/id/abcd-1234", BASE));
        assert_eq!(text_body(request), json!([{":11": "Cafe Rio", ":12": 91}]));
    }

    #[tokio::test]
    async fn test_unsaved_view_is_rejected_before_sending() {
        let (transport, client) = client();
        let err = client.delete_view(&View::new("Draft")).await.unwrap_err();
        assert!(matches!(err, SocrataError::Precondition { .. }));
        assert!(transport.requests().is_empty());
    }
}
