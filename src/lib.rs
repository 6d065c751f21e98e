//! Rain Radar - short-term rain alerts from weather radar imagery.
//!
//! # Overview
//!
//! Every few minutes the radar operator publishes a reflectivity image. The
//! service samples a short history of those images around a watched point,
//! estimates whether rain is there now or closing in, and sends a Telegram
//! message when the risk rises or the expected arrival tightens.
//!
//! # Pipeline
//!
//! 1. [`radar`] downloads and decodes the recent slots
//! 2. [`frames`] keeps the frames inside the history window
//! 3. [`intensity`] samples local intensity and nearest-rain distance per frame
//! 4. [`motion`] fits the distance trend into an arrival estimate
//! 5. [`risk`] classifies the result into a level, score and reasons
//! 6. [`policy`] decides whether the change is worth a message
//! 7. [`telegram`] delivers it and [`storage`] remembers what was decided
//!
//! [`service`] ties the steps into a cycle and [`api`] exposes it over HTTP.

pub mod api;
pub mod config;
pub mod frames;
pub mod intensity;
pub mod model;
pub mod motion;
pub mod policy;
pub mod radar;
pub mod risk;
pub mod service;
pub mod storage;
pub mod telegram;
pub mod timeutil;
