fn main() {
    sexpand::cli::run();
}
