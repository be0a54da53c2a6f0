//! 해시 함수
//!
//! 입력 문자열의 UTF-8 바이트를 해시하고 소문자 16진 문자열을 반환합니다.
//! 체크섬과 murmur3 결과는 정수 값을 자릿수를 채운 16진으로 표기합니다 (시드 0).

use std::io::Cursor;

use data_encoding::HEXLOWER;
use ironpipe_core::types::{Value, ValueType};
use md5::Md5;
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeBody, NativeFunction,
    ParameterDescriptor,
};

/// 해시 알고리즘
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    Crc32,
    Crc32c,
    Md5,
    Murmur3_32,
    Murmur3_128,
    Sha1,
    Sha256,
    Sha512,
}

impl Algorithm {
    pub fn hex_digest(self, input: &[u8]) -> std::io::Result<String> {
        let hex = match self {
            Self::Crc32 => format!("{:08x}", crc32fast::hash(input)),
            Self::Crc32c => format!("{:08x}", crc32c::crc32c(input)),
            Self::Md5 => HEXLOWER.encode(&Md5::digest(input)),
            Self::Murmur3_32 => {
                let hash = murmur3::murmur3_32(&mut Cursor::new(input), 0)?;
                format!("{hash:08x}")
            }
            Self::Murmur3_128 => {
                let hash = murmur3::murmur3_x64_128(&mut Cursor::new(input), 0)?;
                format!("{hash:032x}")
            }
            Self::Sha1 => HEXLOWER.encode(&Sha1::digest(input)),
            Self::Sha256 => HEXLOWER.encode(&Sha256::digest(input)),
            Self::Sha512 => HEXLOWER.encode(&Sha512::digest(input)),
        };
        Ok(hex)
    }
}

fn hash(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    algorithm: Algorithm,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    algorithm
        .hex_digest(value.as_bytes())
        .map(Value::String)
        .map_err(|e| args.runtime_error(e))
}

macro_rules! hasher {
    ($name:ident, $algorithm:expr) => {
        fn $name(
            args: &mut FunctionArgs<'_>,
            ctx: &mut EvaluationContext<'_>,
        ) -> Result<Value, EvalError> {
            hash(args, ctx, $algorithm)
        }
    };
}

hasher!(crc32, Algorithm::Crc32);
hasher!(crc32c, Algorithm::Crc32c);
hasher!(md5, Algorithm::Md5);
hasher!(murmur3_32, Algorithm::Murmur3_32);
hasher!(murmur3_128, Algorithm::Murmur3_128);
hasher!(sha1, Algorithm::Sha1);
hasher!(sha256, Algorithm::Sha256);
hasher!(sha512, Algorithm::Sha512);

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    let hashers: [(&str, NativeBody); 8] = [
        ("crc32", crc32),
        ("crc32c", crc32c),
        ("md5", md5),
        ("murmur3_32", murmur3_32),
        ("murmur3_128", murmur3_128),
        ("sha1", sha1),
        ("sha256", sha256),
        ("sha512", sha512),
    ];

    for (name, body) in hashers {
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(name, ValueType::String)
                .pure()
                .param(ParameterDescriptor::required("value", ValueType::String))
                .build(),
            body,
        ))?;
    }
    Ok(())
}
