//! Static pt-BR translation table.
//!
//! Keys are dotted paths into the table (`"messages.media.photo"`). A missing key
//! renders as the key itself so an untranslated string is visible, never fatal.

use serde_json::{json, Value};

lazy_static::lazy_static! {
    static ref MESSAGES: Value = json!({
        "common": {
            "online": "Online",
            "cancel": "Cancelar",
            "delete": "Excluir",
            "deleting": "Excluindo...",
            "you": "Você",
            "user": "Usuário",
            "error": "Algo deu errado. Por favor, tente novamente.",
            "invalidForm": "Verifique os campos do formulário."
        },
        "app": {
            "welcomeToast": "Seja bem-vindo(a) ao VibeMP"
        },
        "login": {
            "title": "💎 VibeMP",
            "emailLabel": "Endereço de e-mail",
            "passwordLabel": "Senha",
            "loginButton": "Entrar",
            "loggingInButton": "Entrando...",
            "error": "Falha ao entrar. Verifique seu e-mail e senha."
        },
        "signup": {
            "title": "💎 VibeMP",
            "emailLabel": "Endereço de e-mail",
            "usernameLabel": "Nome de usuário",
            "passwordLabel": "Senha",
            "emailInUseError": "Este e-mail já está em uso.",
            "genericError": "Falha ao criar uma conta. Por favor, tente novamente."
        },
        "header": {
            "messageNotification": "{username} te enviou uma mensagem."
        },
        "editProfile": {
            "title": "Editar Perfil",
            "usernameLabel": "Nome de usuário",
            "bioLabel": "Biografia",
            "usernameLength": "O nome de usuário deve ter entre 3 e 30 caracteres.",
            "bioLength": "A biografia pode ter no máximo 150 caracteres.",
            "updateError": "Falha ao atualizar o perfil. Por favor, tente novamente."
        },
        "messages": {
            "title": "Mensagens",
            "newMessage": "Nova mensagem",
            "loading": "Carregando conversas...",
            "noConversations": "Nenhuma conversa ainda.",
            "seen": "Visto",
            "replyingToSelf": "Respondendo a si mesmo",
            "replyingToOther": "Respondendo a {username}",
            "deleteError": "Falha ao excluir a mensagem.",
            "media": {
                "photo": "Foto",
                "video": "Vídeo",
                "audio": "Mensagem de voz",
                "uploadError": "Falha ao enviar mídia.",
                "videoTooLong": "O vídeo não pode ter mais de 30 segundos.",
                "unsupported": "Selecione uma imagem ou vídeo.",
                "tooLarge": "O arquivo é grande demais.",
                "probeFailed": "Não foi possível ler a duração do vídeo."
            },
            "forwardedPost": "Encaminhou uma publicação"
        },
        "crystal": {
            "formed": "💎 Um novo Cristal de Conexão foi formado!",
            "glowing": "💎 Sua conexão está brilhando!",
            "level": {
                "brilhante": "Brilhante",
                "equilibrado": "Equilibrado",
                "apagado": "Apagado",
                "rachado": "Rachado"
            },
            "title": "Cristal de Conexão: {status}",
            "streak": "{streak} dias de interação seguida"
        },
        "createPulse": {
            "invalidFileError": "Por favor, selecione um arquivo de imagem ou vídeo válido.",
            "publishError": "Falha ao criar o pulso. Por favor, tente novamente."
        },
        "pulseViewer": {
            "deleteError": "Falha ao excluir o pulso.",
            "viewSingular": "visualização",
            "viewPlural": "visualizações"
        },
        "welcome": {
            "title": "Bem vindo ao VibeMP"
        },
        "time": {
            "now": "agora",
            "minutes": "{count}min",
            "hours": "{count}h",
            "days": "{count}d",
            "weeks": "{count}sem"
        }
    });
}

/// Looks up `key` and substitutes each `{placeholder}` once.
pub fn t(key: &str, replacements: &[(&str, &str)]) -> String {
    let found = key.split('.').try_fold(&*MESSAGES, |node, part| node.get(part));

    let mut message = match found.and_then(Value::as_str) {
        Some(s) => s.to_string(),
        None => return key.to_string(),
    };

    for (placeholder, value) in replacements {
        message = message.replacen(&format!("{{{placeholder}}}"), value, 1);
    }

    message
}
