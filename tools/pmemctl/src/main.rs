//! pmemctl --- management CLI for persistent-memory DIMMs.
//!
//! Discovers DIMMs from the platform tables (ACPI NFIT/PCAT/PMTT, SMBIOS),
//! decodes DIMM-resident Platform Configuration Data, and wraps every
//! platform access in a record/playback session layer: a recorded session
//! can be saved to a file and replayed deterministically on another
//! machine, without the original hardware.
//!
//! Pipeline per invocation: load persisted session state → run the
//! command (recording or replaying its platform accesses) → persist the
//! session state.

mod cli;
mod context;
mod device;
mod platform;
mod replay;
mod state;
mod verbose;

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use clap::Parser;
use pmem_acpi::pmtt::PmttNode;
use pmem_pbr::{Mode, PassThruRequest, Session, TableKind};
use pmem_pcd::HeaderKind;

use cli::{AcpiTable, Cli, Command, SessionKind};
use context::SessionContext;
use verbose::{dprintln, vprintln};

fn main() -> Result<()> {
    let cli = Cli::parse();
    verbose::init(cli.quiet, cli.verbose);

    let state_dir = state::state_dir()?;

    match cli.command {
        Command::Start(ref args) => cmd_start(state_dir, args),
        Command::Stop(ref args) => cmd_stop(state_dir, args),
        Command::Show(ref args) => cmd_show(state_dir, args),
        Command::Dump(ref args) => cmd_dump(state_dir, args),
        Command::Load(ref args) => cmd_load(state_dir, args),
        Command::Passthru(ref args) => cmd_passthru(state_dir, args),
    }
}

// ===========================================================================
// Session commands
// ===========================================================================

/// Start a record or playback session.
fn cmd_start(state_dir: PathBuf, args: &cli::StartArgs) -> Result<()> {
    match args.session {
        SessionKind::Record => {
            let mut ctx = SessionContext::load(state_dir)?;

            // Starting over discards any prior recording; make sure that
            // is what the user wants.
            if ctx.state.mode != state::PersistedMode::Normal && !args.force {
                dprintln!("Starting a new session will free previously recorded content.");
                if !prompt_yes_no("Continue?")? {
                    return Ok(());
                }
            }

            // Drop the persisted image too, or the next invocation would
            // resume the discarded recording.
            ctx.discard()?;
            ctx.start_recording();
            ctx.save()?;
            dprintln!("Setting to record mode.");
            Ok(())
        }
        SessionKind::Playback | SessionKind::PlaybackManual => {
            let mut ctx = SessionContext::load(state_dir)?;
            ctx.require_loaded_session()?;

            ctx.session
                .set_mode(Mode::Playback)
                .map_err(|e| anyhow::anyhow!("failed to start playback: {e}"))?;

            let start_tag = args.tag.unwrap_or(0);
            ctx.state.mode = state::PersistedMode::Playback;
            ctx.state.tag_id = start_tag;
            if start_tag < ctx.session.tag_count() {
                ctx.session
                    .reset_to_tag(start_tag)
                    .map_err(|e| anyhow::anyhow!("failed to reset session: {e}"))?;
            }
            dprintln!("Setting to playback mode.");

            let result = if args.session == SessionKind::Playback {
                replay::execute_commands(&mut ctx, start_tag)
            } else {
                Ok(())
            };

            ctx.save()?;
            result
        }
    }
}

/// Stop the active session and return to normal mode.
fn cmd_stop(state_dir: PathBuf, args: &cli::StopArgs) -> Result<()> {
    if !args.session {
        bail!("nothing to stop; did you mean 'stop --session'?");
    }
    let mut ctx = SessionContext::load(state_dir)?;
    ctx.discard()?;
    dprintln!("Session stopped.");
    Ok(())
}

/// Write the active session to an image file.
fn cmd_dump(state_dir: PathBuf, args: &cli::DumpArgs) -> Result<()> {
    if !args.session {
        bail!("nothing to dump; did you mean 'dump --session'?");
    }
    let ctx = SessionContext::load(state_dir)?;
    ctx.require_loaded_session()?;

    let image = ctx.session.compose();
    std::fs::write(&args.destination, &image)
        .with_context(|| format!("could not write {}", args.destination.display()))?;
    dprintln!(
        "Dumped session ({} tags, {} bytes) to {}.",
        ctx.session.tag_count(),
        image.len(),
        args.destination.display(),
    );
    Ok(())
}

/// Load a session image file for playback.
fn cmd_load(state_dir: PathBuf, args: &cli::LoadArgs) -> Result<()> {
    if !args.session {
        bail!("nothing to load; did you mean 'load --session'?");
    }
    let image = std::fs::read(&args.source)
        .with_context(|| format!("could not read {}", args.source.display()))?;
    let session = Session::open(&image)
        .map_err(|e| anyhow::anyhow!("{}: {e}", args.source.display()))?;

    state::write_session_image(&state_dir, &image)?;
    state::SessionState::default().save(&state_dir)?;
    dprintln!(
        "Loaded session with {} tags; start playback with 'start --session playback'.",
        session.tag_count(),
    );
    Ok(())
}

// ===========================================================================
// Data commands
// ===========================================================================

/// Show platform, DIMM, or session information.
fn cmd_show(state_dir: PathBuf, args: &cli::ShowArgs) -> Result<()> {
    let selectors = [
        args.session,
        args.dimm,
        args.acpi.is_some(),
        args.pcd.is_some(),
    ];
    if selectors.iter().filter(|&&s| s).count() != 1 {
        bail!("specify exactly one of --session, --dimm, --acpi, --pcd");
    }

    // Decoding a PCD blob touches neither the platform nor the session.
    if let Some(path) = &args.pcd {
        return show_pcd(path);
    }

    let mut ctx = SessionContext::load(state_dir)?;
    let result = if args.session {
        show_session(&mut ctx)
    } else if args.dimm {
        ctx.run_data_command("show --dimm", show_dimm)
    } else {
        let table = args.acpi.expect("selector checked above");
        let invocation = format!("show --acpi {}", table_argument(table));
        ctx.run_data_command(&invocation, |ctx| show_acpi(ctx, table))
    };
    ctx.save()?;
    result
}

/// List every tag of the loaded session, marking the current one.
fn show_session(ctx: &mut SessionContext) -> Result<()> {
    ctx.require_loaded_session()?;

    println!("TagId  Command");
    for id in 0..ctx.session.tag_count() {
        let tag = ctx
            .session
            .get_tag(id)
            .map_err(|e| anyhow::anyhow!("failed to get session tag {id}: {e}"))?;
        let marker = if id == ctx.state.tag_id { '*' } else { ' ' };
        println!("{marker}{id:>5}  {}", tag.name);
    }
    Ok(())
}

/// Show the DIMM inventory decoded from the NFIT and SMBIOS.
fn show_dimm(ctx: &mut SessionContext) -> Result<()> {
    let nfit_bytes = ctx.acquire_table(TableKind::Nfit)?;
    let nfit = match pmem_acpi::parse_nfit(&nfit_bytes) {
        Ok(nfit) => nfit,
        Err(e) => {
            // Malformed platform tables degrade the listing, they do not
            // abort the invocation.
            dprintln!("warning: NFIT is unusable ({e}); no DIMM information available");
            return Ok(());
        }
    };

    let devices = match ctx.acquire_smbios() {
        Ok(snapshot) => {
            let table = pmem_smbios::SmbiosTable::new(&snapshot.data, snapshot.major, snapshot.minor);
            table.memory_devices().unwrap_or_default()
        }
        Err(e) => {
            vprintln!("SMBIOS unavailable ({e}); listing without slot details");
            Vec::new()
        }
    };

    device::print_inventory(&device::build_inventory(&nfit, &devices));
    Ok(())
}

/// Show a parsed ACPI table as key-value lines.
fn show_acpi(ctx: &mut SessionContext, table: AcpiTable) -> Result<()> {
    let kind = match table {
        AcpiTable::Nfit => TableKind::Nfit,
        AcpiTable::Pcat => TableKind::Pcat,
        AcpiTable::Pmtt => TableKind::Pmtt,
    };
    let bytes = ctx.acquire_table(kind)?;

    if let Some(header) = pmem_acpi::TableHeader::read(&bytes) {
        let length = (header.length as usize).min(bytes.len());
        if !pmem_acpi::is_checksum_valid(&bytes[..length]) {
            dprintln!("warning: {} checksum is invalid", kind.name());
        }
    }

    match table {
        AcpiTable::Nfit => print_nfit(&pmem_acpi::parse_nfit(&bytes)?),
        AcpiTable::Pcat => print_pcat(&pmem_acpi::parse_pcat(&bytes)?),
        AcpiTable::Pmtt => print_pmtt(&pmem_acpi::Pmtt::parse(&bytes)?)?,
    }
    Ok(())
}

fn print_nfit(nfit: &pmem_acpi::ParsedNfit) {
    for spa in &nfit.spa_ranges {
        println!(
            "SpaRange: Index={} Base=0x{:x} Length=0x{:x} ProximityDomain={}",
            spa.spa_range_index, spa.base, spa.length, spa.proximity_domain,
        );
    }
    for region in &nfit.regions {
        println!(
            "NvDimmRegion: Handle=0x{:08x} PhysicalId=0x{:04x} Size=0x{:x} SpaIndex={} Ways={}",
            region.device_handle.0,
            region.physical_id,
            region.region_size,
            region.spa_range_index,
            region.interleave_ways,
        );
    }
    for interleave in &nfit.interleaves {
        println!(
            "Interleave: Index={} LineSize={} Lines={}",
            interleave.interleave_index,
            interleave.line_size,
            interleave.line_offsets.len(),
        );
    }
    for ctrl in &nfit.control_regions {
        println!(
            "ControlRegion: Index={} VendorId=0x{:04x} DeviceId=0x{:04x} Serial=0x{:08x}",
            ctrl.control_region_index, ctrl.vendor_id, ctrl.device_id, ctrl.serial_number,
        );
    }
    for caps in &nfit.platform_capabilities {
        println!("PlatformCapabilities: Capabilities=0x{:x}", caps.capabilities);
    }
}

fn print_pcat(pcat: &pmem_acpi::ParsedPcat) {
    for cap in &pcat.capabilities {
        println!(
            "PlatformCapabilityInfo: MgmtSwConfigInput={} 1LM={} 2LM={} AppDirect={}",
            cap.mgmt_sw_config_input_support,
            cap.supports_1lm(),
            cap.supports_2lm(),
            cap.supports_app_direct(),
        );
    }
    for info in &pcat.interleave_capabilities {
        println!(
            "MemoryInterleaveCapability: Mode={} Alignment=2^{} Formats={}",
            info.memory_mode,
            info.interleave_alignment_size,
            info.formats.len(),
        );
        for format in &info.formats {
            println!(
                "  Format: ChannelSize=0x{:02x} ImcSize=0x{:02x} Ways={} Recommended={}",
                format.channel_interleave_size(),
                format.imc_interleave_size(),
                format.channel_ways(),
                format.recommended(),
            );
        }
    }
    for sku in &pcat.socket_skus {
        println!(
            "SocketSkuInfo: Socket={} Die={} MappedLimit=0x{:x} Mapped=0x{:x}",
            sku.socket_id, sku.die_id, sku.mapped_memory_size_limit, sku.total_memory_size_mapped,
        );
    }
}

fn print_pmtt(pmtt: &pmem_acpi::Pmtt<'_>) -> Result<()> {
    for node in pmtt.nodes() {
        let node = node.map_err(|e| anyhow::anyhow!("PMTT: {e}"))?;
        match node {
            PmttNode::Socket { socket_id, .. } => {
                println!("Socket: Id={socket_id} Enabled={}", node.enabled());
            }
            PmttNode::MemController {
                read_bandwidth,
                write_bandwidth,
                ..
            } => {
                println!(
                    "  MemController: ReadBw={read_bandwidth} WriteBw={write_bandwidth} Enabled={}",
                    node.enabled(),
                );
            }
            PmttNode::Module {
                physical_component_id,
                size,
                smbios_handle,
                ..
            } => {
                println!(
                    "    Module: ComponentId=0x{physical_component_id:04x} SizeMiB={size} \
                     SmbiosHandle=0x{smbios_handle:x} Persistent={}",
                    node.is_persistent_module(),
                );
            }
        }
    }
    Ok(())
}

/// Decode and strictly validate a Platform Configuration Data blob.
fn show_pcd(path: &Path) -> Result<()> {
    let partition = std::fs::read(path)
        .with_context(|| format!("could not read {}", path.display()))?;
    let partition_size = partition.len() as u32;

    let header = pmem_pcd::parse_configuration_header(&partition)
        .map_err(|e| anyhow::anyhow!("configuration header: {e}"))?;
    println!(
        "ConfigurationHeader: Revision={} Current={}B Input={}B Output={}B",
        header.header.revision,
        header.current_config_size,
        header.config_input_size,
        header.config_output_size,
    );

    if let Some(data) = header.current_config_slice(&partition) {
        pmem_pcd::validate_header(HeaderKind::CurrentConfig, data, partition_size)
            .map_err(|e| anyhow::anyhow!("current config: {e}"))?;
        let ccur = pmem_pcd::parse_current_config(data)
            .map_err(|e| anyhow::anyhow!("current config: {e}"))?;
        println!(
            "CurrentConfig: Status={} VolatileMapped=0x{:x} PersistentMapped=0x{:x} Records={}",
            ccur.config_status,
            ccur.volatile_memory_size_into_spa,
            ccur.persistent_memory_size_into_spa,
            ccur.records.len(),
        );
    }
    if let Some(data) = header.config_input_slice(&partition) {
        pmem_pcd::validate_header(HeaderKind::ConfigInput, data, partition_size)
            .map_err(|e| anyhow::anyhow!("config input: {e}"))?;
        let cin = pmem_pcd::parse_config_input(data)
            .map_err(|e| anyhow::anyhow!("config input: {e}"))?;
        println!(
            "ConfigInput: SequenceNumber={} Records={}",
            cin.sequence_number,
            cin.records.len(),
        );
    }
    if let Some(data) = header.config_output_slice(&partition) {
        pmem_pcd::validate_header(HeaderKind::ConfigOutput, data, partition_size)
            .map_err(|e| anyhow::anyhow!("config output: {e}"))?;
        let cout = pmem_pcd::parse_config_output(data)
            .map_err(|e| anyhow::anyhow!("config output: {e}"))?;
        println!(
            "ConfigOutput: SequenceNumber={} ValidationStatus={} Records={}",
            cout.sequence_number,
            cout.validation_status,
            cout.records.len(),
        );
    }
    Ok(())
}

/// Issue a raw firmware command to a DIMM.
fn cmd_passthru(state_dir: PathBuf, args: &cli::PassthruArgs) -> Result<()> {
    let mut ctx = SessionContext::load(state_dir)?;
    let invocation = passthru_invocation(args);
    let result = ctx.run_data_command(&invocation, |ctx| run_passthru(ctx, args));
    ctx.save()?;
    result
}

fn run_passthru(ctx: &mut SessionContext, args: &cli::PassthruArgs) -> Result<()> {
    let input = match &args.payload {
        Some(hex) => parse_hex(hex)?,
        None => Vec::new(),
    };

    let request = PassThruRequest {
        duration_ms: 0,
        dimm_id: args.dimm,
        opcode: args.opcode,
        sub_opcode: args.subopcode,
        input,
        large_input: Vec::new(),
    };
    let response = ctx.passthru(&request)?;

    println!(
        "Passthru: Opcode=0x{:02x} SubOpcode=0x{:02x} Status=0x{:02x} ReturnCode=0x{:x}",
        args.opcode, args.subopcode, response.status, response.return_code,
    );
    if !response.output.is_empty() {
        println!("Output: {}", to_hex(&response.output));
    }
    Ok(())
}

// ===========================================================================
// Replay dispatch
// ===========================================================================

/// Re-executes one recorded CLI argument string through the normal
/// command parser. Only data commands replay; the session-management
/// commands are excluded from recording in the first place.
pub(crate) fn dispatch_replayed(ctx: &mut SessionContext, line: &str) -> Result<()> {
    let argv = std::iter::once("pmemctl").chain(line.split_whitespace());
    let cli = Cli::try_parse_from(argv)
        .with_context(|| format!("recorded command '{line}' does not parse"))?;

    // Route through the same bookkeeping as a live invocation, so the
    // cursors reset to this tag and the pending tag id advances.
    match cli.command {
        Command::Show(ref args) if args.dimm => ctx.run_data_command(line, show_dimm),
        Command::Show(ref args) => match args.acpi {
            Some(table) => ctx.run_data_command(line, |ctx| show_acpi(ctx, table)),
            None => bail!("recorded command '{line}' is not replayable"),
        },
        Command::Passthru(ref args) => ctx.run_data_command(line, |ctx| run_passthru(ctx, args)),
        _ => bail!("recorded command '{line}' is not replayable"),
    }
}

// ===========================================================================
// Helpers
// ===========================================================================

fn table_argument(table: AcpiTable) -> &'static str {
    match table {
        AcpiTable::Nfit => "nfit",
        AcpiTable::Pcat => "pcat",
        AcpiTable::Pmtt => "pmtt",
    }
}

fn passthru_invocation(args: &cli::PassthruArgs) -> String {
    let mut line = format!(
        "passthru --dimm {} --opcode {} --subopcode {}",
        args.dimm, args.opcode, args.subopcode,
    );
    if let Some(payload) = &args.payload {
        line.push_str(" --payload ");
        line.push_str(payload);
    }
    line
}

/// Asks a yes/no question on stdout and reads the answer from stdin.
fn prompt_yes_no(question: &str) -> Result<bool> {
    print!("{question} [y/N] ");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    let answer = answer.trim();
    Ok(answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes"))
}

fn parse_hex(s: &str) -> Result<Vec<u8>> {
    let s = s.trim();
    if s.len() % 2 != 0 {
        bail!("hex payload must have an even number of digits");
    }
    (0..s.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&s[i..i + 2], 16)
                .with_context(|| format!("invalid hex byte '{}'", &s[i..i + 2]))
        })
        .collect()
}

fn to_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}
