//! RFC 4648 인코딩 함수
//!
//! 모든 인코더는 `omit_padding` 옵션을 받습니다 (RFC 4648 §3.2).
//! 디코더는 패딩 유무와 상관없이 입력을 받아들이며, 결과가 UTF-8이 아니면 실패합니다.
//!
//! | 함수 접두어 | 알파벳 |
//! |---|---|
//! | `base16` | 소문자 16진 (디코드는 대소문자 무시) |
//! | `base32` | RFC 4648 §6 |
//! | `base32human` | RFC 4648 §7 extended hex, 소문자 출력 |
//! | `base64` | RFC 4648 §4 |
//! | `base64url` | RFC 4648 §5 |

use base64::Engine as _;
use base64::alphabet;
use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE, URL_SAFE_NO_PAD};
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use data_encoding::{
    BASE32, BASE32_NOPAD, BASE32HEX, BASE32HEX_NOPAD, HEXLOWER, HEXLOWER_PERMISSIVE,
};
use ironpipe_core::types::{Value, ValueType};

use crate::context::EvaluationContext;
use crate::error::{EvalError, ProcessorError};
use crate::function::{
    FunctionArgs, FunctionDescriptor, FunctionRegistry, NativeBody, NativeFunction,
    ParameterDescriptor,
};

const LENIENT_PADDING: GeneralPurposeConfig =
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent);
const BASE64_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);
const BASE64URL_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);

/// 인코딩 방식
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Base16,
    Base32,
    Base32Human,
    Base64,
    Base64Url,
}

impl Scheme {
    pub fn encode(self, input: &[u8], omit_padding: bool) -> String {
        match (self, omit_padding) {
            (Self::Base16, _) => HEXLOWER.encode(input),
            (Self::Base32, false) => BASE32.encode(input),
            (Self::Base32, true) => BASE32_NOPAD.encode(input),
            (Self::Base32Human, false) => BASE32HEX.encode(input).to_ascii_lowercase(),
            (Self::Base32Human, true) => BASE32HEX_NOPAD.encode(input).to_ascii_lowercase(),
            (Self::Base64, false) => STANDARD.encode(input),
            (Self::Base64, true) => STANDARD_NO_PAD.encode(input),
            (Self::Base64Url, false) => URL_SAFE.encode(input),
            (Self::Base64Url, true) => URL_SAFE_NO_PAD.encode(input),
        }
    }

    pub fn decode(self, input: &str) -> Result<Vec<u8>, String> {
        match self {
            Self::Base16 => HEXLOWER_PERMISSIVE
                .decode(input.as_bytes())
                .map_err(|e| e.to_string()),
            Self::Base32 | Self::Base32Human => {
                let upper = input.to_ascii_uppercase();
                let padded = upper.contains('=');
                let bytes = upper.as_bytes();
                let decoded = match (self, padded) {
                    (Self::Base32, true) => BASE32.decode(bytes),
                    (Self::Base32, false) => BASE32_NOPAD.decode(bytes),
                    (_, true) => BASE32HEX.decode(bytes),
                    (_, false) => BASE32HEX_NOPAD.decode(bytes),
                };
                decoded.map_err(|e| e.to_string())
            }
            Self::Base64 => BASE64_LENIENT.decode(input).map_err(|e| e.to_string()),
            Self::Base64Url => BASE64URL_LENIENT.decode(input).map_err(|e| e.to_string()),
        }
    }
}

fn encode(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    scheme: Scheme,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let omit_padding = args.flag(ctx, "omit_padding")?;
    Ok(Value::String(scheme.encode(value.as_bytes(), omit_padding)))
}

fn decode(
    args: &mut FunctionArgs<'_>,
    ctx: &mut EvaluationContext<'_>,
    scheme: Scheme,
) -> Result<Value, EvalError> {
    let value = args.required_str(ctx, "value")?;
    let bytes = scheme.decode(&value).map_err(|e| args.runtime_error(e))?;
    String::from_utf8(bytes)
        .map(Value::String)
        .map_err(|_| args.runtime_error("decoded bytes are not valid UTF-8"))
}

macro_rules! codec {
    ($encode:ident, $decode:ident, $scheme:expr) => {
        fn $encode(
            args: &mut FunctionArgs<'_>,
            ctx: &mut EvaluationContext<'_>,
        ) -> Result<Value, EvalError> {
            encode(args, ctx, $scheme)
        }

        fn $decode(
            args: &mut FunctionArgs<'_>,
            ctx: &mut EvaluationContext<'_>,
        ) -> Result<Value, EvalError> {
            decode(args, ctx, $scheme)
        }
    };
}

codec!(base16_encode, base16_decode, Scheme::Base16);
codec!(base32_encode, base32_decode, Scheme::Base32);
codec!(base32human_encode, base32human_decode, Scheme::Base32Human);
codec!(base64_encode, base64_decode, Scheme::Base64);
codec!(base64url_encode, base64url_decode, Scheme::Base64Url);

pub(super) fn register(registry: &mut FunctionRegistry) -> Result<(), ProcessorError> {
    let codecs: [(&str, NativeBody, NativeBody); 5] = [
        ("base16", base16_encode, base16_decode),
        ("base32", base32_encode, base32_decode),
        ("base32human", base32human_encode, base32human_decode),
        ("base64", base64_encode, base64_decode),
        ("base64url", base64url_encode, base64url_decode),
    ];

    for (prefix, encoder, decoder) in codecs {
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(format!("{prefix}_encode"), ValueType::String)
                .pure()
                .param(ParameterDescriptor::required("value", ValueType::String))
                .param(
                    ParameterDescriptor::optional("omit_padding", ValueType::Boolean)
                        .default_value(false),
                )
                .build(),
            encoder,
        ))?;
        registry.register(NativeFunction::new(
            FunctionDescriptor::builder(format!("{prefix}_decode"), ValueType::String)
                .pure()
                .param(ParameterDescriptor::required("value", ValueType::String))
                .build(),
            decoder,
        ))?;
    }
    Ok(())
}
