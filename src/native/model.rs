//! RAII handle over loaded model weights.

use std::ffi::{CStr, CString};
use std::os::raw::c_void;
use std::path::Path;
use std::ptr::NonNull;

use llama_cpp_sys_2 as sys;

use crate::config::ModelParams;
use crate::error::Error;
use crate::token::TokenId;

/// Loaded model weights. Owned exclusively by the worker; freed on drop.
pub struct NativeModel {
    ptr: NonNull<sys::llama_model>,
}

impl NativeModel {
    /// Load weights from `path`. `progress` is invoked by the loader with
    /// fractions in `[0, 1]` and receives `progress_data` verbatim.
    pub(crate) fn load(
        path: &Path,
        params: &ModelParams,
        progress: sys::llama_progress_callback,
        progress_data: *mut c_void,
    ) -> Result<Self, Error> {
        let Some(utf8) = path.to_str() else {
            return Err(Error::InvalidArgument(format!(
                "model path is not valid UTF-8: {}",
                path.display()
            )));
        };
        let c_path = CString::new(utf8)
            .map_err(|_| Error::InvalidArgument("model path contains a NUL byte".into()))?;

        let mut mp = unsafe { sys::llama_model_default_params() };
        mp.n_gpu_layers = params.n_gpu_layers as _;
        mp.main_gpu = params.main_gpu as _;
        mp.vocab_only = params.vocab_only;
        mp.use_mmap = params.use_mmap;
        mp.use_mlock = params.use_mlock;
        mp.progress_callback = progress;
        mp.progress_callback_user_data = progress_data;

        let ptr = unsafe { sys::llama_load_model_from_file(c_path.as_ptr(), mp) };
        NonNull::new(ptr)
            .map(|ptr| Self { ptr })
            .ok_or_else(|| Error::NativeLoadFailure(path.display().to_string()))
    }

    /// Tokenize `text`, optionally asking the library to prepend the BOS
    /// marker. A negative return from the backend is the required buffer
    /// capacity, negated; one resize retry covers it.
    pub(crate) fn tokenize(&self, text: &str, add_bos: bool) -> Result<Vec<TokenId>, Error> {
        let text_len = i32::try_from(text.len())
            .map_err(|_| Error::InvalidArgument("text exceeds the tokenizer input limit".into()))?;
        let mut capacity = text.len() + 8;
        for _ in 0..2 {
            let mut buf = vec![0 as sys::llama_token; capacity];
            let count = unsafe {
                sys::llama_tokenize(
                    self.ptr.as_ptr(),
                    text.as_ptr().cast(),
                    text_len,
                    buf.as_mut_ptr(),
                    capacity as i32,
                    add_bos,
                    false,
                )
            };
            if count >= 0 {
                buf.truncate(count as usize);
                return Ok(buf.into_iter().map(TokenId).collect());
            }
            capacity = count.unsigned_abs() as usize;
        }
        Err(Error::NativeCallFailure { call: "llama_tokenize", status: -1 })
    }

    pub(crate) fn n_vocab(&self) -> usize {
        unsafe { sys::llama_n_vocab(self.ptr.as_ptr()) }.max(0) as usize
    }

    pub(crate) fn token_eos(&self) -> TokenId {
        TokenId(unsafe { sys::llama_token_eos(self.ptr.as_ptr()) })
    }

    /// Vocabulary text for `token`, with the library's leading-space glyph
    /// (U+2581) rewritten to an ASCII space.
    pub(crate) fn token_text(&self, token: TokenId) -> String {
        let ptr = unsafe { sys::llama_token_get_text(self.ptr.as_ptr(), token.0) };
        if ptr.is_null() {
            return String::new();
        }
        let raw = unsafe { CStr::from_ptr(ptr) }.to_string_lossy();
        raw.replace('\u{2581}', " ")
    }

    pub(crate) fn as_ptr(&self) -> *mut sys::llama_model {
        self.ptr.as_ptr()
    }
}

impl Drop for NativeModel {
    fn drop(&mut self) {
        unsafe { sys::llama_free_model(self.ptr.as_ptr()) };
    }
}
