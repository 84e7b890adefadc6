// src/connectors/instagram/mod.rs

use std::borrow::Cow;
use std::sync::Arc;

use async_trait::async_trait;
use rmcp::model::*;
use serde_json::{json, Map, Value};

use crate::error::ConnectorError;
use crate::insights::{InsightsSnapshot, DEFAULT_MAX_MEDIAS};
use crate::Connector;

pub const ACCOUNT_TOOL: &str = "get_insights_account";
pub const MEDIA_TOOL: &str = "get_insights_media_feed_all";
pub const ACCOUNT_RESOURCE_URI: &str = "instagram://insights/account";
pub const MEDIA_RESOURCE_URI: &str = "instagram://insights/media";

const ACCOUNT_TOOL_DESCRIPTION: &str = "Get Instagram account insights, such as:
  * profile_visits_metric_count
  * impressions_metric_count
  * last_week_impressions
  * followers_unit
  * gender_graph
  * all_followers_age_graph
  * followers_top_cities_graph
  * top_posts_unit
  * last_week_posts_count
  * week_over_week_posts_delta
  * stories_unit
  * last_week_stories_count
  * week_over_week_stories_delta
  * summary_stories
  * promotions_unit
  * summary_promotions";

const MEDIA_TOOL_DESCRIPTION: &str = "Get Instagram top-reach-count media insights, such as:
  * instagram_media_type
  * uri
  * like_count
  * save_count
  * video_view_count
  * shopping_product_click_count
  * impressions
  * attributed_follows
  * attributed_profile_visits
  * reach_count
  * profile_actions";

/// Serves the insights fetched at startup. Never calls the platform itself.
pub struct InstagramConnector {
    snapshot: Arc<InsightsSnapshot>,
    max_medias: usize,
}

impl InstagramConnector {
    pub fn new(snapshot: Arc<InsightsSnapshot>) -> Self {
        Self {
            snapshot,
            max_medias: DEFAULT_MAX_MEDIAS,
        }
    }

    pub fn with_max_medias(mut self, max_medias: usize) -> Self {
        self.max_medias = max_medias;
        self
    }

    fn no_arguments_schema() -> Arc<Map<String, Value>> {
        let mut schema = Map::new();
        schema.insert("type".to_string(), json!("object"));
        schema.insert("properties".to_string(), json!({}));
        Arc::new(schema)
    }

    fn render(&self, name: &str) -> Option<String> {
        match name {
            ACCOUNT_TOOL => Some(self.snapshot.account_text()),
            MEDIA_TOOL => Some(self.snapshot.media_text(self.max_medias)),
            _ => None,
        }
    }
}

#[async_trait]
impl Connector for InstagramConnector {
    fn name(&self) -> &'static str {
        "instagram"
    }

    fn description(&self) -> &'static str {
        "Read-only Instagram account and media insights captured at server startup."
    }

    async fn capabilities(&self) -> ServerCapabilities {
        ServerCapabilities::builder()
            .enable_resources()
            .enable_tools()
            .build()
    }

    async fn list_resources(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListResourcesResult, ConnectorError> {
        let _cursor = request.and_then(|r| r.cursor);
        let resources = vec![
            Resource {
                raw: RawResource {
                    uri: ACCOUNT_RESOURCE_URI.to_string(),
                    name: "Account insights".to_string(),
                    title: None,
                    description: Some("Account-level insights as JSON.".to_string()),
                    mime_type: Some("application/json".to_string()),
                    size: None,
                    icons: None,
                },
                annotations: None,
            },
            Resource {
                raw: RawResource {
                    uri: MEDIA_RESOURCE_URI.to_string(),
                    name: "Top media insights".to_string(),
                    title: None,
                    description: Some(
                        "Per-post insights for the top posts, separated by '---' lines."
                            .to_string(),
                    ),
                    mime_type: Some("application/json".to_string()),
                    size: None,
                    icons: None,
                },
                annotations: None,
            },
        ];

        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
    ) -> Result<Vec<ResourceContents>, ConnectorError> {
        let uri = request.uri.as_str();
        let text = match uri {
            ACCOUNT_RESOURCE_URI => self.snapshot.account_text(),
            MEDIA_RESOURCE_URI => self.snapshot.media_text(self.max_medias),
            _ => return Err(ConnectorError::ResourceNotFound),
        };
        Ok(vec![ResourceContents::text(text, uri)])
    }

    async fn list_tools(
        &self,
        request: Option<PaginatedRequestParam>,
    ) -> Result<ListToolsResult, ConnectorError> {
        let _cursor = request.and_then(|r| r.cursor);
        let tools = vec![
            Tool {
                name: Cow::Borrowed(ACCOUNT_TOOL),
                title: None,
                description: Some(Cow::Borrowed(ACCOUNT_TOOL_DESCRIPTION)),
                input_schema: Self::no_arguments_schema(),
                output_schema: None,
                annotations: None,
                icons: None,
            },
            Tool {
                name: Cow::Borrowed(MEDIA_TOOL),
                title: None,
                description: Some(Cow::Borrowed(MEDIA_TOOL_DESCRIPTION)),
                input_schema: Self::no_arguments_schema(),
                output_schema: None,
                annotations: None,
                icons: None,
            },
        ];
        Ok(ListToolsResult {
            tools,
            next_cursor: None,
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
    ) -> Result<CallToolResult, ConnectorError> {
        let text = self
            .render(&request.name)
            .ok_or(ConnectorError::ToolNotFound)?;
        Ok(CallToolResult::success(vec![Content::text(text)]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connector() -> InstagramConnector {
        let media = (0..15).map(|i| json!({ "uri": format!("p{}", i) })).collect();
        let snapshot = InsightsSnapshot::new(json!({ "followers_unit": {} }), media);
        InstagramConnector::new(Arc::new(snapshot))
    }

    fn call(name: &'static str) -> CallToolRequestParam {
        CallToolRequestParam {
            name: Cow::Borrowed(name),
            arguments: None,
        }
    }

    fn text_of(result: &CallToolResult) -> String {
        let value = serde_json::to_value(result).unwrap();
        value["content"][0]["text"].as_str().unwrap_or_default().to_string()
    }

    fn read(uri: &str) -> ReadResourceRequestParam {
        serde_json::from_value(json!({ "uri": uri })).unwrap()
    }

    #[tokio::test]
    async fn lists_both_tools() {
        let result = connector().list_tools(None).await.unwrap();
        let names: Vec<&str> = result.tools.iter().map(|t| t.name.as_ref()).collect();
        assert_eq!(names, vec![ACCOUNT_TOOL, MEDIA_TOOL]);
    }

    #[tokio::test]
    async fn account_tool_returns_json_text() {
        let result = connector().call_tool(call(ACCOUNT_TOOL)).await.unwrap();
        assert_eq!(text_of(&result), r#"{"followers_unit":{}}"#);
    }

    #[tokio::test]
    async fn media_tool_honours_cap() {
        let result = connector()
            .with_max_medias(3)
            .call_tool(call(MEDIA_TOOL))
            .await
            .unwrap();
        assert_eq!(
            text_of(&result),
            "{\"uri\":\"p0\"}\n---\n{\"uri\":\"p1\"}\n---\n{\"uri\":\"p2\"}"
        );
    }

    #[tokio::test]
    async fn unknown_tool_is_rejected() {
        let err = connector().call_tool(call("get_user_medias")).await.unwrap_err();
        assert!(matches!(err, ConnectorError::ToolNotFound));
    }

    #[tokio::test]
    async fn resources_mirror_tools() {
        let c = connector();
        let contents = c
            .read_resource(read(ACCOUNT_RESOURCE_URI))
            .await
            .unwrap();
        assert_eq!(contents.len(), 1);
        let missing = c
            .read_resource(read("instagram://nope"))
            .await;
        assert!(matches!(missing, Err(ConnectorError::ResourceNotFound)));
    }
}
