fn main() {
    hr_dashboard_lib::run()
}
