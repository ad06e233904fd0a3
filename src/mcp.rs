use std::sync::Arc;

use rmcp::{
    handler::server::tool::ToolRouter, handler::server::wrapper::Parameters,
    model::*, tool, tool_handler, tool_router,
    transport::stdio, ErrorData as McpError, ServerHandler, ServiceExt,
};
use schemars::JsonSchema;
use serde::Deserialize;

use crate::config::Config;
use crate::pipeline::{ResearchError, ResearchPipeline, ResearchQuery, DEFAULT_NUM_RESULTS};

#[derive(Debug, Deserialize, JsonSchema)]
struct ResearchPapersParams {
    #[schemars(description = "Research topic to search for")]
    query: String,
    #[schemars(description = "Sources to search (e.g. [\"ArXiv\", \"Google Scholar\"]); defaults to all")]
    sources: Option<Vec<String>>,
    #[schemars(description = "Number of results per source (default 5, max 50)")]
    num_results: Option<u32>,
}

impl ResearchPapersParams {
    fn into_query(self) -> ResearchQuery {
        let mut query = ResearchQuery::new(self.query).with_num_results(self.num_results.unwrap_or(DEFAULT_NUM_RESULTS));
        if let Some(sources) = self.sources {
            query.sources = sources;
        }
        query
    }
}

#[derive(Clone)]
pub struct PaperDigestServer {
    tool_router: ToolRouter<Self>,
    config: Arc<Config>,
    pipeline: Result<Arc<ResearchPipeline>, ResearchError>,
}

#[tool_router]
impl PaperDigestServer {
    pub fn new(config: Arc<Config>, pipeline: Result<Arc<ResearchPipeline>, ResearchError>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            config,
            pipeline,
        }
    }

    #[tool(description = "List available paper sources and their status")]
    async fn list_sources(&self) -> Result<CallToolResult, McpError> {
        let statuses = self.config.source_status();
        let json = serde_json::to_string_pretty(&statuses)
            .map_err(|e| McpError::internal_error(format!("Serialization error: {}", e), None))?;
        Ok(CallToolResult::success(vec![Content::text(json)]))
    }

    #[tool(description = "Search papers on a topic and return each with an LLM summary and an advantages/disadvantages analysis")]
    async fn research_papers(
        &self,
        Parameters(params): Parameters<ResearchPapersParams>,
    ) -> Result<CallToolResult, McpError> {
        let pipeline = self
            .pipeline
            .as_ref()
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;

        match pipeline.spawn_run(params.into_query()).await {
            Ok(result) => {
                let json = serde_json::to_string_pretty(&result)
                    .map_err(|e| McpError::internal_error(format!("{}", e), None))?;
                Ok(CallToolResult::success(vec![Content::text(json)]))
            }
            Err(e @ ResearchError::NoResults { .. }) => {
                Ok(CallToolResult::success(vec![Content::text(e.to_string())]))
            }
            Err(ResearchError::InvalidQuery(msg)) => Err(McpError::invalid_params(msg, None)),
            Err(e) => Err(McpError::internal_error(e.to_string(), None)),
        }
    }
}

#[tool_handler]
impl ServerHandler for PaperDigestServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Research assistant: searches arXiv and Google Scholar for a topic, \
                 then summarizes each paper and lists its advantages and disadvantages."
                    .into(),
            ),
        }
    }
}

/// Serve the MCP tools over stdin/stdout until the client disconnects.
pub async fn serve_stdio(server: PaperDigestServer) -> anyhow::Result<()> {
    let service = server.serve(stdio()).await?;
    service.waiting().await?;
    Ok(())
}
