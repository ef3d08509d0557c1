//! CLI 모듈
//!
//! docqa-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::collector::FileCollector;
use crate::config::{get_data_dir, Config};
use crate::extractor::SUPPORTED_EXTENSIONS;
use crate::rag::{QueryResult, RagSystem, DEFAULT_N_RESULTS};
use crate::server::{run_server, ServerConfig};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "docqa-rag")]
#[command(version, about = "문서 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    /// Voyage AI API 키 (VOYAGE_API_KEY 대신)
    #[arg(long, global = true)]
    pub voyage_key: Option<String>,

    /// Gemini API 키 (GEMINI_API_KEY 대신)
    #[arg(long, global = true)]
    pub gemini_key: Option<String>,

    /// 벡터 DB 경로
    #[arg(long, global = true)]
    pub db_path: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 파일 또는 폴더를 지식베이스에 추가
    Add {
        /// 파일 또는 폴더 경로
        path: PathBuf,

        /// 문서 이름 (단일 파일만, 기본값: 파일 이름)
        #[arg(short, long)]
        name: Option<String>,
    },

    /// 질문하기
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short = 'n', long, default_value_t = DEFAULT_N_RESULTS)]
        results: usize,
    },

    /// 지식베이스 통계
    Stats,

    /// 저장된 문서 목록
    List,

    /// 문서 삭제
    Delete {
        /// 삭제할 문서 이름
        name: String,
    },

    /// 지식베이스 초기화
    Clear,

    /// 대화형 모드
    Interactive,

    /// 웹 서버 실행
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,

        #[arg(short, long, default_value_t = 8000)]
        port: u16,

        /// 채팅 페이지 HTML 파일
        #[arg(long)]
        template: Option<PathBuf>,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = Config::from_env()?.with_overrides(cli.voyage_key, cli.gemini_key, cli.db_path);

    let rag = RagSystem::open(&config)
        .await
        .context("Failed to initialize RAG system")?;

    match cli.command {
        Commands::Add { path, name } => cmd_add(&rag, &path, name.as_deref()).await,
        Commands::Ask { question, results } => cmd_ask(&rag, &question, results).await,
        Commands::Stats => cmd_stats(&rag).await,
        Commands::List => cmd_list(&rag).await,
        Commands::Delete { name } => cmd_delete(&rag, &name).await,
        Commands::Clear => cmd_clear(&rag).await,
        Commands::Interactive => cmd_interactive(&rag).await,
        Commands::Serve {
            host,
            port,
            template,
        } => {
            let server = ServerConfig {
                host,
                port,
                template,
            };
            run_server(server, rag).await
        }
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 추가 명령어 (add)
///
/// 폴더면 지원 형식 파일을 모두 수집해 각각 문서로 추가합니다.
async fn cmd_add(rag: &RagSystem, path: &Path, name: Option<&str>) -> Result<()> {
    if !path.exists() {
        bail!("File not found: {}", path.display());
    }

    if path.is_file() {
        println!("[*] 문서 추가 중: {}", path.display());
        let report = rag.add_document(path, name).await?;

        println!(
            "[OK] Document '{}' successfully added to knowledge base",
            report.doc_name
        );
        println!(
            "     청크: {}/{} 저장",
            report.chunks_stored, report.chunks_total
        );
        if report.skipped_chunks() > 0 {
            println!("[!] 임베딩 실패로 {} 청크를 건너뛰었습니다", report.skipped_chunks());
        }
        return Ok(());
    }

    if name.is_some() {
        println!("[!] 폴더 추가 시 --name은 무시됩니다");
    }

    let files = FileCollector::with_defaults().collect_directory(path)?;
    if files.is_empty() {
        println!(
            "[!] 수집할 파일이 없습니다. 지원 형식: {}",
            SUPPORTED_EXTENSIONS.join(", ")
        );
        return Ok(());
    }

    let total_size: u64 = files.iter().map(|f| f.size).sum();
    println!(
        "[*] 수집 대상: {} 파일 ({})",
        files.len(),
        format_bytes(total_size as usize)
    );

    let mut success_count = 0;
    let mut error_count = 0;

    for (i, file) in files.iter().enumerate() {
        print!("[{}/{}] {}... ", i + 1, files.len(), file.file_name());
        std::io::stdout().flush().ok();

        match rag.add_document(&file.path, None).await {
            Ok(report) => {
                println!("완료 ({} 청크)", report.chunks_stored);
                success_count += 1;
            }
            Err(e) => {
                println!("실패: {:#}", e);
                error_count += 1;
            }
        }
    }

    println!();
    println!("[OK] 완료: 성공 {}, 실패 {}", success_count, error_count);

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(rag: &RagSystem, question: &str, results: usize) -> Result<()> {
    println!("[*] 질문: \"{}\"", question);

    let result = rag.ask(question, results).await?;
    print_answer(&result);

    Ok(())
}

/// 통계 명령어 (stats)
async fn cmd_stats(rag: &RagSystem) -> Result<()> {
    let stats = rag.stats().await.context("Failed to read statistics")?;

    println!("docqa-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 데이터 디렉토리: {}", get_data_dir().display());
    println!("[OK] 총 청크: {}", stats.total_chunks);
    println!("[OK] 총 문서: {}", stats.total_documents);

    if !stats.documents.is_empty() {
        println!();
        for name in &stats.documents {
            println!("  - {}", name);
        }
    }

    Ok(())
}

/// 목록 명령어 (list)
async fn cmd_list(rag: &RagSystem) -> Result<()> {
    let docs = rag.documents().await.context("Failed to list documents")?;

    if docs.is_empty() {
        println!("[!] 저장된 문서가 없습니다.");
        return Ok(());
    }

    println!("[OK] 저장된 문서 ({} 건):\n", docs.len());

    for doc in docs {
        println!("  {} ({} 청크)", truncate_text(&doc.doc_name, 60), doc.chunk_count);
        println!("        출처: {}", doc.source);
        println!("        추가: {}", doc.added_at);
        println!();
    }

    Ok(())
}

/// 삭제 명령어 (delete)
async fn cmd_delete(rag: &RagSystem, name: &str) -> Result<()> {
    let deleted = rag.delete_document(name).await?;
    println!("[OK] 문서 '{}' 삭제됨 ({} 청크)", name, deleted);
    Ok(())
}

/// 초기화 명령어 (clear)
async fn cmd_clear(rag: &RagSystem) -> Result<()> {
    rag.clear().await?;
    println!("[OK] Knowledge base cleared");
    Ok(())
}

/// 대화형 모드 (interactive)
///
/// `add <파일>`, `stats`, `quit`/`exit` 외의 입력은 질문으로 처리합니다.
async fn cmd_interactive(rag: &RagSystem) -> Result<()> {
    println!("docqa-rag 대화형 모드");
    println!("명령어: add <파일>, stats, quit");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("> ");
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await? else {
            break;
        };

        match parse_interactive(&line) {
            InteractiveCommand::Empty => continue,
            InteractiveCommand::Quit => break,
            InteractiveCommand::Stats => {
                if let Err(e) = cmd_stats(rag).await {
                    println!("[!] {:#}", e);
                }
            }
            InteractiveCommand::Add(path) => {
                if let Err(e) = cmd_add(rag, Path::new(&path), None).await {
                    println!("[!] {:#}", e);
                }
            }
            InteractiveCommand::Ask(question) => match rag.ask(&question, DEFAULT_N_RESULTS).await
            {
                Ok(result) => print_answer(&result),
                Err(e) => println!("[!] {:#}", e),
            },
        }
        println!();
    }

    println!("Goodbye!");
    Ok(())
}

#[derive(Debug, PartialEq)]
enum InteractiveCommand {
    Empty,
    Quit,
    Stats,
    Add(String),
    Ask(String),
}

fn parse_interactive(line: &str) -> InteractiveCommand {
    let line = line.trim();
    match line.to_lowercase().as_str() {
        "" => InteractiveCommand::Empty,
        "quit" | "exit" | "q" => InteractiveCommand::Quit,
        "stats" => InteractiveCommand::Stats,
        _ => match line.strip_prefix("add ") {
            Some(path) if !path.trim().is_empty() => InteractiveCommand::Add(path.trim().to_string()),
            _ => InteractiveCommand::Ask(line.to_string()),
        },
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 답변과 출처 출력
fn print_answer(result: &QueryResult) {
    println!("\n[OK] 답변:\n");
    println!("{}", result.answer);

    if !result.sources.is_empty() {
        println!("\n출처:");
        for (i, source) in result.sources.iter().enumerate() {
            println!(
                "  {}. {} [유사도: {:.3}] {}",
                i + 1,
                source.document,
                source.similarity,
                truncate_text(&source.text, 80)
            );
        }
    }

    println!("\n({:.2}초, {} 청크)", result.processing_time, result.chunks_used);
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

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
