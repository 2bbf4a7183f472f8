// Copyright 2025 RustFS Team
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use clap::{Parser, Subcommand};
use injector::inject::InjectorConfig;
use injector::run_inject;

shadow_rs::shadow!(build);

#[derive(Parser)]
#[command(name = "fluid-injector")]
#[command(about = "Fluid fuse sidecar injector CLI", long_about = None)]
#[command(version = build::PKG_VERSION, long_version = build::CLAP_LONG_VERSION)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Inject fuse sidecars into a workload read from YAML
    Inject {
        /// Workload to inject: a Pod, a pod template owner, a custom resource or a List.
        #[arg(short = 'f', long)]
        file: String,

        /// YAML map of Fluid PVC name to runtime info.
        #[arg(short, long)]
        runtime_infos: String,

        /// Optional output path. If not set, the output will be written to stdout.
        #[arg(short, long)]
        output: Option<String>,

        #[command(flatten)]
        config: InjectorConfig,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Inject {
            file,
            runtime_infos,
            output,
            config,
        } => run_inject(file, runtime_infos, output, config).await?,
    }

    Ok(())
}
