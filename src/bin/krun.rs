fn main() {
    kslurm::logging::init();
    let code = kslurm::cli::run(kslurm::cli::krun::command, std::env::args().collect());
    std::process::exit(code);
}
