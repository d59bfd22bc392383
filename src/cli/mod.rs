//! CLI 모듈
//!
//! learnpath-rag CLI 명령어 정의 및 구현
//! - ingest: 리소스 배치를 테넌트 지식 베이스로 수집 (기존 내용 교체)
//! - ask: 테넌트 지식 베이스로 질문에 답변
//! - status: 설정 및 저장 상태 확인

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;

use crate::config::{EngineConfig, GenerationModel, ModelConfiguration};
use crate::embedding::{get_openai_api_key, has_api_key, EmbeddingBackend};
use crate::engine::{AnswerResponse, RagEngine, KNOWLEDGE_DIR};
use crate::ingest::{IngestionState, IngestionStatus};
use crate::knowledge::{ChunkConfig, InMemoryKnowledgeStore, KnowledgeStore, LanceKnowledgeStore};
use crate::types::{ResourceDescriptor, ResourceKind, TenantId};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "learnpath-rag")]
#[command(version, about = "학습 경로별 멀티 테넌트 RAG 엔진", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 모든 명령어 공통 옵션 (환경변수 설정을 덮어씀)
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// 데이터 디렉토리 (기본: LEARNPATH_RAG_DATA_DIR 또는 로컬 데이터 디렉토리)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 생성 모델 (gemini-2.0-flash-lite, gemini-2.0-flash, gemini-1.5-pro)
    #[arg(short, long, global = true)]
    pub model: Option<GenerationModel>,

    /// 임베딩 백엔드 (gemini, openai, local, hashing)
    #[arg(short, long, global = true)]
    pub embedding: Option<EmbeddingBackend>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 리소스를 테넌트 지식 베이스로 수집 (기존 내용 교체)
    Ingest(IngestArgs),

    /// 테넌트 지식 베이스로 질문에 답변
    Ask {
        /// 질문
        question: String,

        /// 테넌트 (학습 경로) ID
        #[arg(short, long)]
        tenant: TenantId,

        /// 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// 검색 결과가 없으면 모델을 호출하지 않음
        #[arg(long)]
        short_circuit: bool,
    },

    /// 상태 확인
    Status {
        /// 청크 수를 확인할 테넌트
        #[arg(short, long)]
        tenant: Option<TenantId>,
    },
}

#[derive(Args, Debug)]
pub struct IngestArgs {
    /// 파일 경로 또는 URL
    pub resources: Vec<String>,

    /// 테넌트 (학습 경로) ID
    #[arg(short, long)]
    pub tenant: TenantId,

    /// 리소스 종류 (생략 시 위치로 추론)
    #[arg(short, long)]
    pub kind: Option<ResourceKind>,

    /// ResourceDescriptor JSON 배열 파일
    #[arg(long)]
    pub descriptors: Option<PathBuf>,

    /// recursive_url 크롤링 깊이
    #[arg(long)]
    pub max_depth: Option<u64>,

    /// youtube 자막 언어
    #[arg(long)]
    pub language: Option<String>,

    /// 청크 크기 (문자, 모델 기본값 대신)
    #[arg(long, requires = "chunk_overlap")]
    pub chunk_size: Option<usize>,

    /// 청크 오버랩 (문자)
    #[arg(long, requires = "chunk_size")]
    pub chunk_overlap: Option<usize>,

    /// 동시에 로드할 리소스 수
    #[arg(short, long)]
    pub concurrency: Option<usize>,

    /// 디스크 대신 메모리 저장소 사용 (프로세스 종료 시 사라짐)
    #[arg(long)]
    pub memory: bool,

    /// 수집 직후 물어볼 질문
    #[arg(long)]
    pub ask: Option<String>,
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut config = EngineConfig::from_env().context("환경변수 설정 오류")?;
    apply_global_args(&mut config, &cli.global);

    match cli.command {
        Commands::Ingest(args) => cmd_ingest(config, args).await,
        Commands::Ask {
            question,
            tenant,
            top_k,
            short_circuit,
        } => {
            if let Some(k) = top_k {
                config.top_k = k;
            }
            config.short_circuit_empty_context |= short_circuit;
            cmd_ask(config, &question, &tenant).await
        }
        Commands::Status { tenant } => cmd_status(config, tenant).await,
    }
}

fn apply_global_args(config: &mut EngineConfig, global: &GlobalArgs) {
    if let Some(dir) = &global.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(model) = global.model {
        config.model = model;
    }
    if let Some(backend) = global.embedding {
        config.embedding = backend;
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
async fn cmd_ingest(mut config: EngineConfig, args: IngestArgs) -> Result<()> {
    check_api_keys(&config)?;

    if let Some(n) = args.concurrency {
        config.load_concurrency = n;
    }

    let resources = build_descriptors(&args)?;
    if resources.is_empty() {
        bail!("수집할 리소스가 없습니다. 경로/URL 또는 --descriptors를 지정하세요.");
    }

    let mut model_config = config.model_configuration()?;
    if let (Some(size), Some(overlap)) = (args.chunk_size, args.chunk_overlap) {
        model_config = model_config.with_chunk_config(ChunkConfig::new(size, overlap)?);
    }

    let engine = open_engine(&config, args.memory).await?;

    println!(
        "[*] {} 리소스 수집 시작 (tenant: {}, model: {}, embedding: {})",
        resources.len(),
        args.tenant,
        config.model,
        config.embedding
    );
    print_model_configuration(&model_config);

    let (tx, mut rx) = mpsc::channel::<IngestionState>(32);
    let ingest = engine.ingest_with_progress(resources, args.tenant.clone(), &model_config, tx);
    let report = async {
        while let Some(state) = rx.recv().await {
            if state.status == IngestionStatus::Processing && state.processed_count > 0 {
                println!("    [{}/{}] 로드 완료", state.processed_count, state.total_count);
            }
        }
    };
    let (state, _) = tokio::join!(ingest, report);

    match state.status {
        IngestionStatus::Completed => {
            let count = engine.count(&args.tenant).await.unwrap_or(0);
            println!(
                "[OK] 수집 완료: {} 리소스, {} 청크 (run: {})",
                state.processed_count, count, state.run_id
            );
        }
        _ => {
            bail!(
                "수집 실패 ({}/{} 처리됨): {}",
                state.processed_count,
                state.total_count,
                state.error.unwrap_or_default()
            );
        }
    }

    if let Some(question) = args.ask {
        print_answer(&engine.answer(&question, &args.tenant).await);
    }

    Ok(())
}

/// 질의 명령어 (ask)
async fn cmd_ask(config: EngineConfig, question: &str, tenant: &TenantId) -> Result<()> {
    check_api_keys(&config)?;
    if !has_api_key() {
        bail!("답변 생성에는 GEMINI_API_KEY 또는 GOOGLE_AI_API_KEY가 필요합니다.");
    }

    let engine = open_engine(&config, false).await?;

    println!("[*] 질문 중 (tenant: {}): \"{}\"", tenant, truncate_text(question, 80));
    let response = engine.answer(question, tenant).await;
    print_answer(&response);

    if let Some(error) = &response.error {
        tracing::debug!("Answer error: {}", error);
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(config: EngineConfig, tenant: Option<TenantId>) -> Result<()> {
    println!("learnpath-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", config.data_dir.display());
    println!("[*] 생성 모델: {}", config.model);
    println!(
        "[*] 임베딩: {} ({}차원)",
        config.embedding,
        config.embedding.dimension()
    );

    if has_api_key() {
        println!("[OK] Gemini API 키: 설정됨");
    } else {
        println!("[!] Gemini API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }
    if config.embedding == EmbeddingBackend::OpenAi {
        if get_openai_api_key().is_some() {
            println!("[OK] OpenAI API 키: 설정됨");
        } else {
            println!("[!] OpenAI API 키: 미설정 (export OPENAI_API_KEY=your-key)");
        }
    }

    let Some(tenant) = tenant else {
        return Ok(());
    };

    let path = config.data_dir.join(KNOWLEDGE_DIR);
    if !path.exists() {
        println!("[!] 지식 저장소가 아직 없습니다: {}", path.display());
        return Ok(());
    }

    match LanceKnowledgeStore::open(&path).await {
        Ok(store) => match store.count(&tenant).await {
            Ok(count) => println!("[OK] {} 저장된 청크: {} 건", tenant, count),
            Err(e) => println!("[!] 청크 수 조회 실패: {}", e),
        },
        Err(e) => println!("[!] 지식 저장소 열기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

async fn open_engine(config: &EngineConfig, memory: bool) -> Result<RagEngine> {
    let engine = if memory {
        RagEngine::with_store(config, Arc::new(InMemoryKnowledgeStore::new()))?
    } else {
        RagEngine::open(config)
            .await
            .context("지식 저장소 열기 실패")?
    };
    Ok(engine)
}

/// 임베딩 백엔드에 필요한 API 키 확인
fn check_api_keys(config: &EngineConfig) -> Result<()> {
    match config.embedding {
        EmbeddingBackend::Gemini if !has_api_key() => bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_AI_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey\n\
             API 키 없이 실행하려면 --embedding local (fastembed) 또는 --embedding hashing"
        ),
        EmbeddingBackend::OpenAi if get_openai_api_key().is_none() => {
            bail!("OPENAI_API_KEY가 설정되지 않았습니다.")
        }
        _ => Ok(()),
    }
}

/// 인자에서 리소스 디스크립터 목록 생성
fn build_descriptors(args: &IngestArgs) -> Result<Vec<ResourceDescriptor>> {
    let mut descriptors = Vec::new();

    if let Some(path) = &args.descriptors {
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("디스크립터 파일 읽기 실패: {:?}", path))?;
        let parsed: Vec<ResourceDescriptor> =
            serde_json::from_str(&json).context("디스크립터 JSON 파싱 실패")?;
        descriptors.extend(parsed);
    }

    for location in &args.resources {
        let kind = args.kind.unwrap_or_else(|| infer_kind(location));
        let mut descriptor = ResourceDescriptor::new(location.clone(), kind, args.tenant.clone());

        if let Some(depth) = args.max_depth {
            descriptor = descriptor.with_metadata("max_depth", depth);
        }
        if let Some(language) = &args.language {
            descriptor = descriptor.with_metadata("language", language.as_str());
        }

        descriptors.push(descriptor);
    }

    Ok(descriptors)
}

/// 위치 문자열로 리소스 종류 추론
fn infer_kind(location: &str) -> ResourceKind {
    let lower = location.to_lowercase();
    let is_url = lower.starts_with("http://") || lower.starts_with("https://");

    if is_url && (lower.contains("youtube.com/") || lower.contains("youtu.be/")) {
        return ResourceKind::Youtube;
    }

    let path = lower.split(['?', '#']).next().unwrap_or(&lower);
    if path.ends_with(".pdf") {
        ResourceKind::Pdf
    } else if path.ends_with(".docx") {
        ResourceKind::Docx
    } else if path.ends_with(".csv") {
        ResourceKind::Csv
    } else if is_url {
        ResourceKind::Webpage
    } else {
        ResourceKind::Text
    }
}

fn print_model_configuration(config: &ModelConfiguration) {
    println!(
        "    청크: {}자 / 오버랩 {}자 (컨텍스트 {} 토큰)",
        config.chunk_config().chunk_size(),
        config.chunk_config().chunk_overlap(),
        config.context_window_tokens
    );
}

fn print_answer(response: &AnswerResponse) {
    if response.is_error() {
        println!("\n[!] {}", response.display_text());
    } else {
        println!("\n{}", response.display_text());
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
