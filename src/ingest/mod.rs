//! 수집 오케스트레이터
//!
//! 상태 머신: pending → processing → completed | failed
//!
//! 리소스는 제한된 동시성으로 로드/청킹되며 입력 순서를 유지합니다.
//! 첫 실패에서 중단하고 저장소는 건드리지 않습니다.
//! 모두 성공하면 전체 청크를 한 번에 임베딩하고 테넌트 파티션을 교체합니다.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use uuid::Uuid;

use crate::config::{ModelConfiguration, DEFAULT_LOAD_CONCURRENCY};
use crate::embedding::{embed_chunks, EmbeddingProvider};
use crate::error::{IngestError, LoadError};
use crate::knowledge::{split, KnowledgeStore};
use crate::loader::ResourceLoader;
use crate::types::{Chunk, ResourceDescriptor, TenantId};

// ============================================================================
// Ingestion State
// ============================================================================

/// 수집 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl IngestionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, IngestionStatus::Completed | IngestionStatus::Failed)
    }
}

/// 수집 실행 상태
///
/// 전이 메서드는 모두 새 값을 반환합니다. 저장되지 않으며 호출자가 보관합니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionState {
    pub run_id: Uuid,
    pub status: IngestionStatus,
    pub resources: Vec<ResourceDescriptor>,
    pub tenant_id: TenantId,
    pub processed_count: usize,
    pub total_count: usize,
    pub error: Option<String>,
    /// 완료 시 채워지는 지식 베이스 참조 (테넌트 ID)
    pub knowledge_store_ref: Option<TenantId>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl IngestionState {
    pub fn pending(tenant_id: TenantId, resources: Vec<ResourceDescriptor>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            status: IngestionStatus::Pending,
            total_count: resources.len(),
            resources,
            tenant_id,
            processed_count: 0,
            error: None,
            knowledge_store_ref: None,
            started_at: None,
            finished_at: None,
        }
    }

    pub fn start(&self) -> Self {
        Self {
            status: IngestionStatus::Processing,
            started_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn record_processed(&self) -> Self {
        Self {
            processed_count: (self.processed_count + 1).min(self.total_count),
            ..self.clone()
        }
    }

    pub fn complete(&self) -> Self {
        Self {
            status: IngestionStatus::Completed,
            knowledge_store_ref: Some(self.tenant_id.clone()),
            finished_at: Some(Utc::now()),
            ..self.clone()
        }
    }

    pub fn fail(&self, error: impl ToString) -> Self {
        Self {
            status: IngestionStatus::Failed,
            error: Some(error.to_string()),
            finished_at: Some(Utc::now()),
            ..self.clone()
        }
    }
}

// ============================================================================
// Orchestrator
// ============================================================================

/// 수집 오케스트레이터
pub struct IngestionOrchestrator {
    loader: ResourceLoader,
    embedder: Arc<dyn EmbeddingProvider>,
    store: Arc<dyn KnowledgeStore>,
    concurrency: usize,
}

impl IngestionOrchestrator {
    pub fn new(
        loader: ResourceLoader,
        embedder: Arc<dyn EmbeddingProvider>,
        store: Arc<dyn KnowledgeStore>,
    ) -> Self {
        Self {
            loader,
            embedder,
            store,
            concurrency: DEFAULT_LOAD_CONCURRENCY,
        }
    }

    /// 동시에 로드할 리소스 수
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// 수집 실행
    ///
    /// 실패는 반환되지 않고 `failed` 상태로 기록됩니다.
    /// `progress`가 있으면 모든 상태 전이를 전송합니다.
    pub async fn run(
        &self,
        resources: Vec<ResourceDescriptor>,
        tenant: TenantId,
        config: &ModelConfiguration,
        progress: Option<mpsc::Sender<IngestionState>>,
    ) -> IngestionState {
        let pending = IngestionState::pending(tenant, resources);
        emit(&progress, &pending);

        let mut state = pending.start();
        emit(&progress, &state);

        tracing::info!(
            "Ingestion {} started: {} resources for tenant {} ({})",
            state.run_id,
            state.total_count,
            state.tenant_id,
            config.model
        );

        state = match self.execute(&mut state, config, &progress).await {
            Ok(stored) => {
                tracing::info!("Ingestion {} completed: {} chunks stored", state.run_id, stored);
                state.complete()
            }
            Err(e) => {
                tracing::warn!("Ingestion {} failed: {}", state.run_id, e);
                state.fail(e)
            }
        };

        emit(&progress, &state);
        state
    }

    async fn execute(
        &self,
        state: &mut IngestionState,
        config: &ModelConfiguration,
        progress: &Option<mpsc::Sender<IngestionState>>,
    ) -> Result<usize, IngestError> {
        let tenant = state.tenant_id.clone();

        // 로드 전에 테넌트 불일치 확인
        if let Some(foreign) = state.resources.iter().find(|r| r.tenant_id != tenant) {
            return Err(LoadError::TenantMismatch {
                location: foreign.location.clone(),
                expected: tenant.to_string(),
                actual: foreign.tenant_id.to_string(),
            }
            .into());
        }

        let chunk_config = *config.chunk_config();
        let loader = &self.loader;
        let resources = state.resources.clone();

        let mut loaded = stream::iter(resources.into_iter().map(|descriptor| async move {
            let fragments = loader.load(&descriptor).await?;
            let chunks = split(&fragments, &chunk_config);
            tracing::debug!("{}: {} chunks", descriptor.location, chunks.len());
            Ok::<Vec<Chunk>, LoadError>(chunks)
        }))
        .buffered(self.concurrency);

        let mut all_chunks: Vec<Chunk> = Vec::new();
        while let Some(result) = loaded.next().await {
            // 첫 실패에서 스트림을 버리면 진행 중인 로드도 취소됨
            all_chunks.extend(result?);
            *state = state.record_processed();
            emit(progress, state);
        }
        drop(loaded);

        let vectors = embed_chunks(self.embedder.as_ref(), &all_chunks).await?;
        let stored = self.store.replace(&tenant, &all_chunks, &vectors).await?;

        Ok(stored)
    }
}

/// 진행 상태 전송 (수집을 막지 않음)
///
/// 채널이 가득 차면 해당 상태는 버려집니다. 최종 상태는 `run`의 반환값으로 전달됩니다.
fn emit(progress: &Option<mpsc::Sender<IngestionState>>, state: &IngestionState) {
    let Some(tx) = progress else {
        return;
    };

    match tx.try_send(state.clone()) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            tracing::debug!(
                "Progress channel full, dropping {:?} update for run {}",
                state.status,
                state.run_id
            );
        }
        Err(TrySendError::Closed(_)) => {
            tracing::debug!("Progress receiver dropped for run {}", state.run_id);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
