//! 学校信息系统身份与访问核心
//! 认证服务与 API 网关共享的类型和组件

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod rabbitmq;
pub mod repository;
pub mod response;
pub mod routes;
pub mod services;
pub mod store;
pub mod telemetry;
