//! End-to-end composite: upload both images, run the workflow, wait for the
//! result and resize it.
use crate::comfyui::client::ComfyUIClient;
use crate::comfyui::poller::ResultPoller;
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::imaging;
use crate::workflow::Workflow;

/// Run one composite and return the resized result as PNG bytes.
///
/// `size` is checked against the allow-list before anything touches the
/// backend.
pub async fn composite(
    client: &ComfyUIClient,
    config: &Config,
    original: Vec<u8>,
    replacement: Vec<u8>,
    size: u32,
) -> AppResult<Vec<u8>> {
    let size = config.validate_size(size)?;
    let mut workflow = Workflow::load(&config.workflow_path).await?;

    let (original, replacement) = tokio::task::spawn_blocking(move || {
        Ok::<_, AppError>((imaging::decode(&original)?, imaging::decode(&replacement)?))
    })
    .await??;

    let (original_name, replacement_name) = tokio::try_join!(
        client.upload_image(&original, config.slots.original),
        client.upload_image(&replacement, config.slots.replacement),
    )?;
    workflow.set_image_slots(&config.slots, &original_name, &replacement_name)?;

    let run_id = client.submit_workflow(&workflow).await?;
    let output = ResultPoller::new(client, &config.poll).fetch_output(&run_id).await?;

    let max_pixels = config.max_output_pixels;
    let resized = tokio::task::spawn_blocking(move || imaging::resize(&output, size, max_pixels)).await??;
    tracing::info!(run_id = %run_id, size, bytes = resized.len(), "Composite ready");
    Ok(resized)
}
