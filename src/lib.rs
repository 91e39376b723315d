pub mod api;
pub mod core;
pub mod frame_extractor;

pub fn init_logging() {
    #[cfg(target_os = "android")]
    {
        android_logger::init_once(
            android_logger::Config::default()
                .with_max_level(log::LevelFilter::Debug)
                .with_tag("slide_lib"),
        );
    }

    #[cfg(not(target_os = "android"))]
    {
        // RUST_LOG 未设置时默认 info；重复调用直接忽略
        let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .try_init();
    }
}
