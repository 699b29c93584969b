use crate::{
    api::{self, AppState},
    cli::args::{DraftArgs, ExportArgs, GenerateArgs, ServeArgs, TransferArgs},
    core::{
        blob::LocalBlobStore,
        bundle::{Bundle, BundleBuilder},
        config::{BridgeConfig, ConfigLoader},
        export::ExportPackager,
        forms::TemplateEngine,
        store::{load_workspace, MemoryStore},
        textgen::{DescriptionDrafter, HttpTextGenerator},
        transfer::TransferEngine,
        types::TransferStatus,
    },
    Result,
};
use anyhow::anyhow;
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

struct Workspace {
    config: BridgeConfig,
    store: Arc<MemoryStore>,
    service_id: String,
    data_dir: PathBuf,
}

async fn open_workspace(path: &Option<PathBuf>) -> Result<Workspace> {
    let dir = path.clone().unwrap_or_else(|| PathBuf::from("."));
    let config = ConfigLoader::load_from_workspace(&dir)?;
    let data_dir = dir.join(&config.workspace.data_dir);
    let (store, service_id) = load_workspace(&data_dir).await?;
    Ok(Workspace {
        config,
        store: Arc::new(store),
        service_id,
        data_dir,
    })
}

fn template_blob(workspace: &Workspace) -> Arc<LocalBlobStore> {
    Arc::new(LocalBlobStore::new(workspace.data_dir.clone(), ""))
}

fn storage_blob(workspace: &Workspace) -> Arc<LocalBlobStore> {
    Arc::new(LocalBlobStore::new(
        workspace.config.storage.root.clone(),
        &workspace.config.storage.bucket,
    ))
}

async fn build_bundle(workspace: &Workspace) -> Result<Bundle> {
    let engine = TemplateEngine::new(
        template_blob(workspace),
        workspace.config.templates.clone(),
    );
    let builder = BundleBuilder::new(workspace.store.clone(), engine);
    Ok(builder.build(&workspace.service_id).await?)
}

pub async fn generate(args: GenerateArgs) -> Result<()> {
    let workspace = open_workspace(&args.workspace).await?;
    let bundle = build_bundle(&workspace).await?;

    write_bundle_to_dir(&bundle, &args.out)?;

    println!("Bundle for '{}' written to {}", bundle.service_name, args.out.display());
    println!("  main:         {}", bundle.main_file);
    println!("  subprocesses: {}", bundle.subprocess_files.len());
    println!("  forms:        {}", bundle.forms.len());
    Ok(())
}

fn write_bundle_to_dir(bundle: &Bundle, out: &Path) -> Result<()> {
    fs::create_dir_all(out.join("subprocesses"))?;
    fs::create_dir_all(out.join("forms"))?;

    fs::write(out.join(&bundle.main_file), &bundle.main_xml)?;
    for subprocess in &bundle.subprocess_files {
        fs::write(
            out.join("subprocesses").join(&subprocess.filename),
            &subprocess.xml,
        )?;
    }
    for form in &bundle.forms {
        fs::write(
            out.join("forms").join(&form.filename),
            serde_json::to_string_pretty(&form.content)?,
        )?;
    }
    fs::write(
        out.join("manifest.json"),
        serde_json::to_vec_pretty(&bundle.manifest)?,
    )?;
    Ok(())
}

pub async fn transfer(args: TransferArgs) -> Result<()> {
    let workspace = open_workspace(&args.workspace).await?;
    let bundle = build_bundle(&workspace).await?;

    let mut modeler = workspace.config.modeler.clone();
    if args.project.is_some() {
        modeler.project_name = args.project;
    }
    let engine = TransferEngine::new(modeler)?;
    let result = engine.transfer(&bundle).await?;

    println!(
        "Transferred '{}' into project {} / folder {}",
        bundle.service_name, result.project_id, result.folder_id
    );
    for uploaded in &result.uploaded {
        println!("  ok      {} ({})", uploaded.name, uploaded.remote_id);
    }
    for failed in &result.failed {
        println!("  FAILED  {}: {}", failed.name, failed.error);
    }

    match result.status {
        TransferStatus::Complete => Ok(()),
        TransferStatus::Partial => Err(anyhow!(
            "transfer partially failed: {} of {} files did not upload",
            result.failed.len(),
            result.failed.len() + result.uploaded.len()
        )),
    }
}

pub async fn export(args: ExportArgs) -> Result<()> {
    let workspace = open_workspace(&args.workspace).await?;
    let bundle = build_bundle(&workspace).await?;

    let packager = ExportPackager::new(storage_blob(&workspace));
    let result = packager.package(&bundle).await?;

    println!("Exported '{}' under {}", bundle.service_name, result.folder_prefix);
    println!("Archive: {}", result.archive_ref);
    Ok(())
}

pub async fn draft(args: DraftArgs) -> Result<()> {
    let workspace = open_workspace(&args.workspace).await?;
    let endpoint = args
        .endpoint
        .or_else(|| workspace.config.textgen.endpoint.clone())
        .ok_or_else(|| anyhow!("no text-generation endpoint configured (set [textgen] endpoint or pass --endpoint)"))?;

    let generator = Arc::new(HttpTextGenerator::new(
        &endpoint,
        &workspace.config.textgen.model,
    ));
    let drafter = DescriptionDrafter::new(workspace.store.clone(), generator);
    let text = drafter
        .draft_service_description(&workspace.service_id)
        .await?;

    println!("Drafted service description:\n{}", text);
    Ok(())
}

pub async fn serve(args: ServeArgs) -> Result<()> {
    let workspace = open_workspace(&args.workspace).await?;
    let bind: SocketAddr = args
        .bind
        .parse()
        .map_err(|e| anyhow!("invalid bind address '{}': {}", args.bind, e))?;

    let state = AppState::new(
        workspace.store.clone(),
        template_blob(&workspace),
        storage_blob(&workspace),
        workspace.config.clone(),
    )?;
    Ok(api::serve(state, bind).await?)
}
