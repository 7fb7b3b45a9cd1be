use crate::error::Result;
use crate::identifier::Identifier;
use crate::listener::PlasticListener;
use crate::message_id::{self, ECHO, GET_DESCRIPTION, GET_NAME, GET_VERSION};
use crate::value::Value;
use crate::PLASTIC_VERSION;
use async_trait::async_trait;
use std::sync::Arc;

/// Listener answering the generic messages every application understands.
///
/// Echo, name, description and version queries are answered directly and
/// hub events are accepted silently. Anything else goes to the inner
/// listener, if there is one.
pub struct BasicApplication {
    name: String,
    description: Option<String>,
    inner: Option<(Vec<Identifier>, Arc<dyn PlasticListener>)>,
}

impl BasicApplication {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            description: None,
            inner: None,
        }
    }

    pub fn with_description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Delegates `messages` to `listener`
    pub fn with_listener(
        mut self,
        messages: Vec<Identifier>,
        listener: Arc<dyn PlasticListener>,
    ) -> Self {
        self.inner = Some((messages, listener));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every message this application answers
    pub fn supported_messages(&self) -> Vec<Identifier> {
        let mut messages = vec![
            ECHO.clone(),
            GET_NAME.clone(),
            GET_DESCRIPTION.clone(),
            GET_VERSION.clone(),
        ];
        messages.extend(message_id::hub_events());
        if let Some((extra, _)) = &self.inner {
            for msg in extra {
                if !messages.contains(msg) {
                    messages.push(msg.clone());
                }
            }
        }
        messages
    }
}

#[async_trait]
impl PlasticListener for BasicApplication {
    async fn perform(
        &self,
        sender: &Identifier,
        message: &Identifier,
        args: &[Value],
    ) -> Result<Value> {
        if *message == *ECHO {
            return Ok(args.first().cloned().unwrap_or(Value::Null));
        }
        if *message == *GET_NAME {
            return Ok(Value::from(self.name.as_str()));
        }
        if *message == *GET_DESCRIPTION {
            return Ok(Value::from(
                self.description.clone().unwrap_or_else(|| self.name.clone()),
            ));
        }
        if *message == *GET_VERSION {
            return Ok(Value::from(PLASTIC_VERSION));
        }
        if message_id::is_hub_event(message) {
            return Ok(Value::Null);
        }
        match &self.inner {
            Some((_, listener)) => listener.perform(sender, message, args).await,
            None => Ok(Value::Null),
        }
    }
}

impl std::fmt::Debug for BasicApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BasicApplication")
            .field("name", &self.name)
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listener::FnListener;

    fn sender() -> Identifier {
        Identifier::parse("plastic://hub/1-1-test").unwrap()
    }

    #[tokio::test]
    async fn test_generic_messages() {
        let app = BasicApplication::new("hub").with_description("PLASTIC hub");
        let s = sender();
        assert_eq!(
            app.perform(&s, &ECHO, &[Value::from("ping")]).await.unwrap(),
            Value::from("ping")
        );
        assert_eq!(app.perform(&s, &ECHO, &[]).await.unwrap(), Value::Null);
        assert_eq!(
            app.perform(&s, &GET_NAME, &[]).await.unwrap(),
            Value::from("hub")
        );
        assert_eq!(
            app.perform(&s, &GET_DESCRIPTION, &[]).await.unwrap(),
            Value::from("PLASTIC hub")
        );
        assert_eq!(
            app.perform(&s, &message_id::HUB_STOPPING, &[]).await.unwrap(),
            Value::Null
        );
    }

    #[tokio::test]
    async fn test_delegation() {
        let custom = Identifier::parse("ivo://example.org/custom").unwrap();
        let app = BasicApplication::new("app").with_listener(
            vec![custom.clone()],
            Arc::new(FnListener::new(|_, _, _| async { Ok(Value::Int(42)) })),
        );
        assert!(app.supported_messages().contains(&custom));
        assert_eq!(
            app.perform(&sender(), &custom, &[]).await.unwrap(),
            Value::Int(42)
        );
    }
}
