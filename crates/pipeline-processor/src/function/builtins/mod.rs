//! 내장 함수 라이브러리
//!
//! 모든 내장 함수는 결정적이며 I/O를 하지 않습니다.
//! 메시지를 읽거나 바꾸는 함수는 비순수로 선언됩니다.
//!
//! - [`conversion`]: 타입 변환과 타입 검사
//! - [`strings`]: 문자열, 정규식, 키-값 추출
//! - [`arrays`]: 리스트 조작
//! - [`encoding`]: base16/32/64 인코딩
//! - [`hashing`]: 체크섬과 다이제스트
//! - [`json`]: JSON 파싱과 JSONPath 선택
//! - [`urls`]: URL 인코딩
//! - [`dates`]: 날짜 파싱/포맷
//! - [`periods`]: 기간 생성
//! - [`messages`]: 메시지 필드, 스트림, 드롭, 메시지 생성

pub mod arrays;
pub mod conversion;
pub mod dates;
pub mod encoding;
pub mod hashing;
pub mod json;
pub mod messages;
pub mod periods;
pub mod strings;
pub mod urls;

use crate::error::ProcessorError;

use super::FunctionRegistry;

/// 모든 내장 함수를 등록합니다.
pub fn register_all(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    conversion::register(registry)?;
    strings::register(registry)?;
    arrays::register(registry)?;
    encoding::register(registry)?;
    hashing::register(registry)?;
    json::register(registry)?;
    urls::register(registry)?;
    dates::register(registry)?;
    periods::register(registry)?;
    messages::register(registry)?;
    Ok(())
}
