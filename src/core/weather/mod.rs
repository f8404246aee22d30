pub mod weather_service;

pub use weather_service::{ForecastEntry, WeatherProvider, WeatherQuery, WeatherReport, WeatherService};
