pub mod oauth;
pub mod saml;
pub mod token;
