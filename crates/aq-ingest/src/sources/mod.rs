pub mod airnow;
pub mod airvisual;
pub mod openaq;
pub mod openweathermap;
pub mod purpleair;
pub mod waqi;

pub use airnow::AirNowAdapter;
pub use airvisual::AirVisualAdapter;
pub use openaq::OpenAqAdapter;
pub use openweathermap::OpenWeatherMapAdapter;
pub use purpleair::PurpleAirAdapter;
pub use waqi::WaqiAdapter;
