use clap::Parser;
use heatsim::error::Result;
use heatsim::grid::Grid;
use heatsim::output;
use heatsim::sim;
use heatsim::stats::Stats;
use heatsim::topology::Topology;
use std::path::PathBuf;

/// Distributed 2D heat-field simulation over a torus of worker ranks
#[derive(Parser)]
#[command(name = "heatsim", version)]
struct Cli {
    /// Field width in cells
    #[arg(long, default_value_t = 64)]
    width: usize,

    /// Field height in cells
    #[arg(long, default_value_t = 64)]
    height: usize,

    /// Process grid width (torus x dimension)
    #[arg(long, default_value_t = 2)]
    dim_x: usize,

    /// Process grid height (torus y dimension)
    #[arg(long, default_value_t = 2)]
    dim_y: usize,

    /// Number of simulation steps
    #[arg(long, default_value_t = 100)]
    steps: usize,

    /// Write the final field as CSV to this path
    #[arg(long)]
    output: Option<PathBuf>,

    /// Print performance stats to stderr
    #[arg(long)]
    stats: bool,
}

/// Initial condition for the demo: a hot square in the center of an
/// otherwise cold field.
fn initial_field(width: usize, height: usize) -> Result<Grid> {
    let mut field = Grid::new(width, height, 0)?;
    let (x0, x1) = (width * 3 / 8, width * 5 / 8 + 1);
    let (y0, y1) = (height * 3 / 8, height * 5 / 8 + 1);
    for y in y0..y1 {
        for x in x0..x1 {
            *field.cell_mut(x as isize, y as isize) = 100.0;
        }
    }
    Ok(field)
}

/// The demo's local update: a four-neighbor diffusion average. The
/// library treats the update as an opaque contract; this is just what the
/// binary plugs in.
fn diffuse(tile: &Grid) -> Grid {
    const ALPHA: f64 = 0.2;
    let mut next = tile.clone();
    for y in 0..tile.height as isize {
        for x in 0..tile.width as isize {
            let center = tile.cell(x, y);
            let around =
                tile.cell(x - 1, y) + tile.cell(x + 1, y) + tile.cell(x, y - 1) + tile.cell(x, y + 1);
            *next.cell_mut(x, y) = center + ALPHA * (around - 4.0 * center);
        }
    }
    next
}

/// Run the whole mesh inside one process, one thread per rank.
#[cfg(not(feature = "distributed"))]
fn run(cli: &Cli, mut stats: Option<&mut Stats>) -> Result<Option<Grid>> {
    use heatsim::transport::MemoryMesh;

    let rank_count = cli.dim_x * cli.dim_y;
    // Validate the shape before spawning anything.
    Topology::build(cli.dim_x, cli.dim_y, 0, rank_count)?;

    let mesh = MemoryMesh::new(rank_count);
    let field = initial_field(cli.width, cli.height)?;

    let result = std::thread::scope(|scope| {
        for rank in 1..rank_count {
            let transport = mesh.endpoint(rank);
            let (dim_x, dim_y, steps) = (cli.dim_x, cli.dim_y, cli.steps);
            scope.spawn(move || {
                let outcome = Topology::build(dim_x, dim_y, rank, rank_count)
                    .and_then(|topology| sim::run_worker(&transport, &topology, steps, diffuse));
                if let Err(e) = outcome {
                    // The run cannot produce a meaningful result once any
                    // rank drops out; fail the whole process.
                    eprintln!("rank {rank}: {e}");
                    std::process::exit(1);
                }
            });
        }
        let transport = mesh.endpoint(0);
        let topology = Topology::build(cli.dim_x, cli.dim_y, 0, rank_count)?;
        sim::run_leader(
            &transport,
            &topology,
            &field,
            cli.steps,
            diffuse,
            stats.as_deref_mut(),
        )
    })?;
    Ok(Some(result))
}

/// Run as one rank of an MPI job; the launcher provides the process group.
#[cfg(feature = "distributed")]
fn run(cli: &Cli, mut stats: Option<&mut Stats>) -> Result<Option<Grid>> {
    use heatsim::error::HeatsimError;
    use heatsim::transport_mpi::MpiTransport;
    use mpi::traits::*;

    let universe = mpi::initialize()
        .ok_or_else(|| HeatsimError::Topology("MPI initialization failed".into()))?;
    let world = universe.world();
    let rank = world.rank() as usize;
    let rank_count = world.size() as usize;

    let outcome = (|| {
        let topology = Topology::build(cli.dim_x, cli.dim_y, rank, rank_count)?;
        let transport = MpiTransport::new();
        if rank == 0 {
            let field = initial_field(cli.width, cli.height)?;
            sim::run_leader(
                &transport,
                &topology,
                &field,
                cli.steps,
                diffuse,
                stats.as_deref_mut(),
            )
            .map(Some)
        } else {
            sim::run_worker(&transport, &topology, cli.steps, diffuse).map(|()| None)
        }
    })();

    match outcome {
        Ok(result) => Ok(result),
        Err(e) => {
            // A partial topology or partially exchanged halo has no
            // well-defined state to continue from; take the job down.
            eprintln!("rank {rank}: {e}");
            world.abort(1);
        }
    }
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut stats = if cli.stats { Some(Stats::new()) } else { None };

    let result = run(&cli, stats.as_mut()).unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    // Only the leader holds the assembled field.
    if let Some(field) = result {
        if let Some(path) = &cli.output {
            let outcome = std::fs::File::create(path)
                .map_err(heatsim::error::HeatsimError::from)
                .and_then(|mut f| output::write_field_csv(&field, &mut f));
            if let Err(e) = outcome {
                eprintln!("Output error: {e}");
                std::process::exit(1);
            }
        }
        let mean = field.data.iter().sum::<f64>() / field.data.len() as f64;
        tracing::info!(
            width = field.width,
            height = field.height,
            mean,
            "run complete"
        );
    }

    if let Some(stats) = &stats {
        stats.display();
    }
}
