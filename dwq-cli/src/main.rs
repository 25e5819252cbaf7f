//! dwq CLI - DWARFクエリエンジンのコマンドラインインターフェース
//!
//! クエリを1回コンパイルし、入力ファイルごとにDwarf値を初期スタックへ
//! 積んで評価します。ファイルなしなら空のスタックから始めます。

use anyhow::Result;
use clap::Parser;
use dwq_core::{Query, Stack, Value, ValueKind};
use dwq_core::value::{Doneness, DwarfRef};
use dwq_dwarf::DwarfContext;
use tracing_subscriber::EnvFilter;

/// dwq - query engine for DWARF debug information
#[derive(Parser)]
#[command(name = "dwq")]
#[command(version = "0.1.0")]
#[command(about = "Evaluate stack-language queries against DWARF debug info", long_about = None)]
struct Cli {
    /// Query program (overrides the positional form)
    #[arg(short = 'e', long = "expr")]
    expr: Option<String>,

    /// Query program (unless -e is given), then input files
    args: Vec<String>,
}

fn main() -> Result<()> {
    // 環境変数 RUST_LOG でログレベルを制御可能 (例: RUST_LOG=debug dwq ...)
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let (program, files) = match cli.expr {
        Some(expr) => (expr, cli.args),
        None => {
            let mut args = cli.args.into_iter();
            let program = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("no query program given"))?;
            (program, args.collect())
        }
    };

    let voc = dwq_core::vocabulary();
    let mut query = Query::compile(&program, &voc)?;

    if files.is_empty() {
        let results = query.run(Stack::new())?;
        print_results(&results);
        return Ok(());
    }

    for file in &files {
        let ctx = DwarfContext::load(file)?;
        let mut stk = Stack::new();
        stk.push(Value::new(
            ValueKind::Dwarf(DwarfRef {
                ctx,
                doneness: Doneness::Cooked,
            }),
            0,
        ));
        let results = query.run(stk)?;
        print_results(&results);
    }

    Ok(())
}

/// 結果スタックを上から順に表示する
///
/// 複数値のスタックは `---` で区切る。
fn print_results(results: &[Stack]) {
    for stk in results {
        if stk.size() > 1 {
            println!("---");
        }
        for value in stk.values().iter().rev() {
            println!("{}", value.show());
        }
    }
}
